//! Fuzz test for the XML lexer and mapping compiler
//!
//! Arbitrary documents must either parse into a consistent token collection
//! or fail with an error, never panic.
//!
//! Run with: cargo +nightly fuzz run xml_lexer_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use mtas_core::MappingConfig;
use mtas_parser::{DocumentLexer, XmlLexer};
use std::sync::OnceLock;

const MAPPING: &str = r#"<parser name="xml">
    <references><reference name="ptr" ref="target"/></references>
    <variables>
      <variable name="person" value="id"><value><item type="attribute" name="name"/></value></variable>
    </variables>
    <mappings>
      <mapping type="word" name="w" start="from" end="to">
        <token><pre><item type="name"/></pre><post><item type="textSplit" split="|"/></post></token>
      </mapping>
      <mapping type="wordAnnotation" name="pos">
        <token><pre><item type="ancestorWordName"/></pre><post><item type="text"/></post></token>
      </mapping>
      <mapping type="group" name="s" offset="reference">
        <token><pre><item type="name"/></pre><post><item type="variableFromAttribute" name="person" value="who"/></post></token>
        <condition><item type="unknownAncestor" number="0"/></condition>
      </mapping>
      <mapping type="relation" name="note" start="from" end="to">
        <token><pre><item type="name"/></pre></token>
      </mapping>
    </mappings>
  </parser>"#;

fn config() -> &'static MappingConfig {
    static CONFIG: OnceLock<MappingConfig> = OnceLock::new();
    CONFIG.get_or_init(|| {
        let mut config = MappingConfig::from_xml_str(MAPPING).expect("fuzz mapping is valid");
        config.autorepair = true;
        config
    })
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let Ok(tokens) = XmlLexer::new(config()).parse_str(input) else {
            return;
        };

        // Repaired collections keep only positioned tokens with live parents.
        for token in tokens.iter() {
            assert!(token.has_positions(), "token {} without positions", token.id);
            if let Some(parent) = token.parent_id {
                assert!(tokens.get(parent).is_some(), "dangling parent {}", parent);
            }
        }
    }
});
