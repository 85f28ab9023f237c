//! Fuzz test for the Penn Treebank lexer
//!
//! Bracket soup must never panic; balanced input must keep word positions
//! dense and increasing.
//!
//! Run with: cargo +nightly fuzz run penn_lexer_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use mtas_core::{Category, MappingConfig};
use mtas_parser::{DocumentLexer, PennLexer};
use std::sync::OnceLock;

const MAPPING: &str = r#"<parser name="penn">
    <autorepair value="true"/>
    <mappings>
      <mapping type="word" name="word">
        <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
      </mapping>
      <mapping type="wordAnnotation" name="pos">
        <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
      </mapping>
      <mapping type="group" name="NP">
        <token><pre><item type="attribute" name="label"/></pre></token>
      </mapping>
      <mapping type="group" name="CODE">
        <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
      </mapping>
    </mappings>
  </parser>"#;

fn config() -> &'static MappingConfig {
    static CONFIG: OnceLock<MappingConfig> = OnceLock::new();
    CONFIG.get_or_init(|| MappingConfig::from_xml_str(MAPPING).expect("fuzz mapping is valid"))
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let Ok(tokens) = PennLexer::new(config()).parse_str(input) else {
            return;
        };

        let positions: Vec<u32> = tokens
            .iter()
            .filter(|t| t.category == Category::Word)
            .filter_map(|t| t.min_position())
            .collect();
        for (expected, position) in positions.iter().enumerate() {
            assert_eq!(*position as usize, expected, "word positions must be dense");
        }
    }
});
