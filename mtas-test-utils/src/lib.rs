//! MTAS Test Utilities
//!
//! Shared test infrastructure for the MTAS workspace:
//! - Mapping and document fixtures for every source format
//! - Proptest generators for documents and mapping shapes
//! - Assertions over token collections

pub use mtas_core::{
    Category, ConfigError, DocumentFormat, MappingConfig, MtasError, MtasResult, OffsetRange,
    ParseError, Position, Token, TokenCollection, TokenId,
};
pub use mtas_parser::{lexer_for, DocumentLexer};

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Words and sentences in generic XML.
    pub const XML_WORDS_MAPPING: &str = r#"<parser name="xml">
        <mappings>
          <mapping type="word" name="w">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="pos">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="s">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="n"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    /// Groups whose offset comes from pointers to word ids.
    pub const XML_REFERENCE_MAPPING: &str = r#"<parser name="xml">
        <references><reference name="ptr" ref="target"/></references>
        <mappings>
          <mapping type="word" name="w">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="s" offset="reference">
            <token><pre><item type="name"/></pre></token>
          </mapping>
          <mapping type="relation" name="link" position="reference" offset="reference">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="type"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    /// Entities that print a person name declared anywhere in the document.
    pub const XML_VARIABLE_MAPPING: &str = r#"<parser name="xml">
        <variables>
          <variable name="person" value="id">
            <value><item type="attribute" name="name" filter="uppercase"/></value>
          </variable>
        </variables>
        <mappings>
          <mapping type="word" name="w">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="ent">
            <token>
              <pre><item type="name"/></pre>
              <post><item type="string" value="who:"/><item type="variableFromAttribute" name="person" value="ref"/></post>
            </token>
          </mapping>
        </mappings>
      </parser>"#;

    /// Time anchored utterance parts: words register their `from`/`to`
    /// anchors, notes without words borrow the span between them.
    pub const XML_LOCAL_REFERENCE_MAPPING: &str = r#"<parser name="xml">
        <mappings>
          <mapping type="word" name="w" start="from" end="to">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="u">
            <token><pre><item type="name"/></pre></token>
          </mapping>
          <mapping type="relation" name="note" start="from" end="to">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="kind"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    /// Nested `g` groups around `w` words with `|` separated text. A word
    /// yields one token per (ancestor group, text segment) pair.
    pub const XML_CARTESIAN_MAPPING: &str = r#"<parser name="xml">
        <mappings>
          <mapping type="word" name="w">
            <token>
              <pre><item type="ancestorGroupAttribute" name="n"/></pre>
              <post><item type="textSplit" split="|"/></post>
            </token>
          </mapping>
          <mapping type="group" name="g">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="n"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    /// Sentence, clause and pair groups over CRM rows.
    pub const CRM_MAPPING: &str = r#"<parser name="crm">
        <functions>
          <function name="pos" column="3">
            <value pattern="^1(\d)" output="noun$1"/>
            <value pattern="^2" output="verb"/>
          </function>
        </functions>
        <mappings>
          <mapping type="word" name="word">
            <token><pre><item type="string" value="t"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="2">
            <token><pre><item type="string" value="lemma"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="pos">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="crmSentence">
            <token><pre><item type="name"/></pre></token>
          </mapping>
          <mapping type="group" name="crmClause">
            <token><pre><item type="name"/></pre></token>
          </mapping>
          <mapping type="relation" name="crmPair">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    pub const SKETCH_MAPPING: &str = r#"<parser name="sketch">
        <mappings>
          <mapping type="word" name="word">
            <token><pre><item type="string" value="t"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="1">
            <token><pre><item type="string" value="pos"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="2">
            <token><pre><item type="string" value="lemma"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="s">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="id"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    pub const PENN_MAPPING: &str = r#"<parser name="penn">
        <mappings>
          <mapping type="word" name="word">
            <token><pre><item type="string" value="t"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="pos">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="NP">
            <token><pre><item type="attribute" name="base"/></pre><post><item type="attribute" name="function"/></post></token>
          </mapping>
          <mapping type="group" name="ROOT">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="id"/></post></token>
          </mapping>
          <mapping type="group" name="CODE">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    pub const XML_SENTENCE: &str = "<doc><s n=\"1\"><w>Hello</w><w>world</w></s></doc>";

    pub const CRM_DOCUMENT: &str = "@key @word @lemma @code @s @c @pm @pi\n\
        k1 De de 300 + + - -\n\
        k2 kat kat 12 - - b a1\n\
        k3 slaapt slapen 200 - + e a1\n";

    pub const SKETCH_DOCUMENT: &str = "<doc>\n<s id=\"s1\">\nHello\tUH\thello\n<g/>\n!\tPUNCT\t!\n</s>\n</doc>\n";

    pub const PENN_DOCUMENT: &str =
        "( (S (NP-SBJ (DT The) (NN cat) (CODE animal)) (VP (VBD sat) (-NONE- *T*-1)) (. .)) (ID s1))";

    /// Build a config from mapping XML.
    pub fn config(xml: &str) -> MappingConfig {
        MappingConfig::from_xml_str(xml).expect("fixture mapping is valid")
    }

    /// Parse a document with the lexer the config selects.
    pub fn parse(config: &MappingConfig, document: &str) -> MtasResult<TokenCollection> {
        lexer_for(config).parse_str(document)
    }

    /// Postfix values of every token of a type, in token order.
    pub fn postfixes(tokens: &TokenCollection, type_name: &str) -> Vec<String> {
        tokens.of_type(type_name).filter_map(Token::postfix).collect()
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    // === Text ===

    /// A word form safe in every source format.
    pub fn arb_word() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,7}"
    }

    /// A non-empty word form with at least one non-ASCII letter.
    pub fn arb_accented_word() -> impl Strategy<Value = String> {
        ("[a-z]{0,3}", prop::sample::select(vec!["é", "ü", "ß", "ø", "æ"]), "[a-z]{0,3}")
            .prop_map(|(a, b, c)| format!("{}{}{}", a, b, c))
    }

    pub fn arb_sentence() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop_oneof![4 => arb_word(), 1 => arb_accented_word()], 1..8)
    }

    pub fn arb_sentences() -> impl Strategy<Value = Vec<Vec<String>>> {
        prop::collection::vec(arb_sentence(), 1..5)
    }

    // === Enums ===

    pub fn arb_category() -> impl Strategy<Value = Category> {
        prop::sample::select(Category::ALL.to_vec())
    }

    // === Documents ===

    /// Sentences as generic XML for [`fixtures::XML_WORDS_MAPPING`].
    pub fn xml_document(sentences: &[Vec<String>]) -> String {
        let mut out = String::from("<doc>");
        for (i, sentence) in sentences.iter().enumerate() {
            out.push_str(&format!("<s n=\"{}\">", i + 1));
            for word in sentence {
                out.push_str(&format!("<w>{}</w> ", word));
            }
            out.push_str("</s>\n");
        }
        out.push_str("</doc>");
        out
    }

    pub fn arb_xml_document() -> impl Strategy<Value = (Vec<Vec<String>>, String)> {
        arb_sentences().prop_map(|sentences| {
            let document = xml_document(&sentences);
            (sentences, document)
        })
    }

    /// Sentences as Penn trees for [`fixtures::PENN_MAPPING`].
    pub fn penn_document(sentences: &[Vec<String>]) -> String {
        sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let leaves: Vec<String> = sentence.iter().map(|w| format!("(NN {})", w)).collect();
                format!("( (S (NP-SBJ {})) (ID s{}))", leaves.join(" "), i + 1)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `depth` nested groups around one word with `segments` text pieces,
    /// for [`fixtures::XML_CARTESIAN_MAPPING`].
    pub fn cartesian_document(depth: usize, segments: &[String]) -> String {
        let mut out = String::new();
        for level in 0..depth {
            out.push_str(&format!("<g n=\"n{}\">", level));
        }
        out.push_str(&format!("<w>{}</w>", segments.join("|")));
        for _ in 0..depth {
            out.push_str("</g>");
        }
        out
    }

    pub fn arb_cartesian_shape() -> impl Strategy<Value = (usize, Vec<String>)> {
        (1usize..5, prop::collection::vec(arb_word(), 1..5))
    }

    /// Person declarations and entity mentions, for
    /// [`fixtures::XML_VARIABLE_MAPPING`]. `declare_first` puts the
    /// declarations in front of the mentions.
    pub fn variable_document(people: &[(String, String)], declare_first: bool) -> String {
        let declarations: String = people
            .iter()
            .map(|(id, name)| format!("<person id=\"{}\" name=\"{}\"/>", id, name))
            .collect();
        let mentions: String = people
            .iter()
            .map(|(id, name)| format!("<ent ref=\"#{}\"><w>{}</w></ent>", id, name))
            .collect();
        if declare_first {
            format!("<doc>{}{}</doc>", declarations, mentions)
        } else {
            format!("<doc>{}{}</doc>", mentions, declarations)
        }
    }

    pub fn arb_people() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::btree_map("p[0-9]{1,3}", arb_word(), 1..6)
            .prop_map(|people| people.into_iter().collect())
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;
    use std::collections::HashSet;

    pub fn assert_parse_error<T: std::fmt::Debug>(result: &MtasResult<T>) {
        assert!(
            matches!(result, Err(MtasError::Parse(_))),
            "Expected parse error, got {:?}",
            result
        );
    }

    pub fn assert_config_error<T: std::fmt::Debug>(result: &Result<T, ConfigError>) {
        assert!(result.is_err(), "Expected config error, got {:?}", result);
    }

    pub fn assert_positions(token: &Token, expected: &[Position]) {
        let actual: Vec<Position> = token.positions.iter().copied().collect();
        assert_eq!(actual, expected, "positions of token {} ({})", token.id, token.type_name);
    }

    /// Word tokens appear in document order with one position each.
    pub fn assert_words_monotonic(tokens: &TokenCollection) {
        let mut last: Option<Position> = None;
        for token in tokens.iter().filter(|t| t.category == Category::Word) {
            assert_eq!(token.positions.len(), 1, "word {} has {:?}", token.id, token.positions);
            let position = token.positions.iter().copied().next().unwrap_or_default();
            if let Some(last) = last {
                assert!(position > last, "word position {} after {}", position, last);
            }
            last = Some(position);
        }
    }

    /// Every token with a parent sits inside the parent's offset range.
    pub fn assert_offsets_nested(tokens: &TokenCollection) {
        for token in tokens.iter() {
            let (Some(parent_id), Some(offset)) = (token.parent_id, token.offset) else {
                continue;
            };
            let Some(parent_offset) = tokens.get(parent_id).and_then(|p| p.offset) else {
                continue;
            };
            assert!(
                parent_offset.contains(&offset),
                "token {} offset {:?} outside parent {:?}",
                token.id,
                offset,
                parent_offset
            );
        }
    }

    /// Following parent links always terminates at an existing root.
    pub fn assert_parents_acyclic(tokens: &TokenCollection) {
        for token in tokens.iter() {
            let mut seen: HashSet<TokenId> = HashSet::new();
            let mut current = token.parent_id;
            while let Some(id) = current {
                assert!(seen.insert(id), "parent cycle through token {}", id);
                let parent = tokens.get(id);
                assert!(parent.is_some(), "token {} points at missing parent {}", token.id, id);
                current = parent.and_then(|p| p.parent_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;

    #[test]
    fn test_fixture_mappings_build() {
        for xml in [
            XML_WORDS_MAPPING,
            XML_REFERENCE_MAPPING,
            XML_VARIABLE_MAPPING,
            XML_LOCAL_REFERENCE_MAPPING,
            XML_CARTESIAN_MAPPING,
            CRM_MAPPING,
            SKETCH_MAPPING,
            PENN_MAPPING,
        ] {
            config(xml);
        }
    }

    #[test]
    fn test_document_builders() {
        let sentences = vec![vec!["a".to_string(), "b".to_string()]];
        assert_eq!(xml_document(&sentences), "<doc><s n=\"1\"><w>a</w> <w>b</w> </s>\n</doc>");
        assert_eq!(penn_document(&sentences), "( (S (NP-SBJ (NN a) (NN b))) (ID s1))");
        assert_eq!(
            cartesian_document(2, &["x".to_string(), "y".to_string()]),
            "<g n=\"n0\"><g n=\"n1\"><w>x|y</w></g></g>"
        );
    }
}
