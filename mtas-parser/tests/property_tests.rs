//! Property-Based Tests for the Mapping Compiler
//!
//! Properties checked over generated documents:
//! - Word positions are dense and follow document order
//! - Ancestor offset policies produce ranges that contain their words
//! - Parent links never form cycles
//! - Multi-valued pre and post items yield `m * n` tokens
//! - Variables resolve the same whether declared before or after use
//! - Resolving the ledger twice changes nothing

use mtas_core::{Category, Position, Token, TokenCollection, TokenValue};
use mtas_parser::Ledger;
use mtas_test_utils::assertions::*;
use mtas_test_utils::fixtures::*;
use mtas_test_utils::generators::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Sentences carrying a `mark` relation that takes its positions and
/// offset from the enclosing sentence.
const MARK_MAPPING: &str = r#"<parser name="xml">
    <mappings>
      <mapping type="word" name="w">
        <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
      </mapping>
      <mapping type="group" name="s">
        <token><pre><item type="name"/></pre><post><item type="attribute" name="n"/></post></token>
      </mapping>
      <mapping type="relation" name="mark" position="ancestorGroup" offset="ancestorGroup">
        <token><pre><item type="name"/></pre></token>
      </mapping>
    </mappings>
  </parser>"#;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_word_positions_follow_document_order((sentences, document) in arb_xml_document()) {
        let config = config(XML_WORDS_MAPPING);
        let tokens = parse(&config, &document).unwrap();
        assert_words_monotonic(&tokens);

        let total: usize = sentences.iter().map(Vec::len).sum();
        prop_assert_eq!(tokens.of_type("w").count(), total);
        let mut next: Position = 0;
        for (sentence, group) in sentences.iter().zip(tokens.of_type("s")) {
            let expected: Vec<Position> = (next..next + sentence.len() as Position).collect();
            prop_assert_eq!(group.positions.iter().copied().collect::<Vec<_>>(), expected);
            next += sentence.len() as Position;
        }
        prop_assert_eq!(postfixes(&tokens, "w"), sentences.concat());
    }

    #[test]
    fn prop_ancestor_offsets_contain_words((_, document) in arb_xml_document()) {
        let document = document.replace("\">", "\"><mark/>");
        let config = config(MARK_MAPPING);
        let tokens = parse(&config, &document).unwrap();
        assert_offsets_nested(&tokens);

        let words: Vec<&Token> = tokens.of_type("w").collect();
        for mark in tokens.of_type("mark") {
            let sentence = tokens.get(mark.parent_id.unwrap()).unwrap();
            prop_assert_eq!(mark.offset, sentence.offset);
            prop_assert_eq!(&mark.positions, &sentence.positions);
            let range = mark.offset.unwrap();
            for word in words.iter().filter(|w| mark.positions.is_superset(&w.positions)) {
                prop_assert!(range.contains(&word.offset.unwrap()));
            }
        }
    }

    #[test]
    fn prop_parent_links_are_acyclic(sentences in arb_sentences()) {
        let xml = parse(&config(XML_WORDS_MAPPING), &xml_document(&sentences)).unwrap();
        assert_parents_acyclic(&xml);
        let penn = parse(&config(PENN_MAPPING), &penn_document(&sentences)).unwrap();
        assert_parents_acyclic(&penn);
        assert_words_monotonic(&penn);
        prop_assert_eq!(penn.of_type("ROOT").count(), sentences.len());
    }

    #[test]
    fn prop_cartesian_cardinality((depth, segments) in arb_cartesian_shape()) {
        let config = config(XML_CARTESIAN_MAPPING);
        let tokens = parse(&config, &cartesian_document(depth, &segments)).unwrap();
        let words: Vec<&Token> = tokens.of_type("w").collect();
        prop_assert_eq!(words.len(), depth * segments.len());
        for token in &words {
            prop_assert_eq!(token.positions.len(), 1);
        }
        prop_assert_eq!(tokens.of_type("g").count(), depth);
    }

    #[test]
    fn prop_variables_resolve_regardless_of_order(people in arb_people()) {
        let config = config(XML_VARIABLE_MAPPING);
        let early = parse(&config, &variable_document(&people, true)).unwrap();
        let late = parse(&config, &variable_document(&people, false)).unwrap();

        let expected: Vec<String> = people
            .iter()
            .map(|(_, name)| format!("who:{}", name.to_uppercase()))
            .collect();
        prop_assert_eq!(postfixes(&early, "ent"), expected.clone());
        prop_assert_eq!(postfixes(&late, "ent"), expected);
    }

    #[test]
    fn prop_ledger_resolution_is_idempotent(
        anchors in prop::collection::btree_map("[a-d][0-9]", prop::collection::btree_set(0u32..50, 1..4), 1..6),
        wanted in prop::collection::vec(prop::collection::vec("[a-d][0-9]", 1..3), 1..6),
    ) {
        let mut ledger = Ledger::new();
        for (id, positions) in &anchors {
            ledger.record_positions(id, positions);
        }
        let mut tokens = TokenCollection::new();
        for ids in &wanted {
            let id = tokens.next_id();
            tokens.push(Token::new(id, Category::Relation, "link", TokenValue::literal("link", "")));
            ledger.defer_positions(id, ids.clone());
            ledger.defer_offset(id, ids.clone());
        }

        let first = ledger.resolve(&mut tokens, 10);
        let once = tokens.clone();
        let second = ledger.resolve(&mut tokens, 10);
        prop_assert_eq!(first, second);
        prop_assert_eq!(&once, &tokens);

        let anchors: BTreeMap<String, BTreeSet<u32>> = anchors;
        for (token, ids) in tokens.iter().zip(&wanted) {
            let expected: BTreeSet<u32> = ids
                .iter()
                .filter_map(|id| anchors.get(id))
                .flatten()
                .copied()
                .collect();
            prop_assert_eq!(&token.positions, &expected);
        }
    }
}
