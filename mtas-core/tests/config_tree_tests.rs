//! Mapping models built from programmatic configuration trees

use mtas_core::{
    Category, ConfigError, ConfigNode, DocumentFormat, Filter, MappingConfig, SourcePolicy, ValueKind,
    ValueSource, XmlFlavor,
};
use proptest::prelude::*;

fn item(kind: &str) -> ConfigNode {
    ConfigNode::new("item").with_attr("type", kind)
}

fn word_mapping(token: ConfigNode) -> ConfigNode {
    ConfigNode::new("mapping")
        .with_attr("type", "word")
        .with_attr("name", "w")
        .with_child(token)
}

fn parser(name: &str, mapping: ConfigNode) -> ConfigNode {
    ConfigNode::new("parser")
        .with_attr("name", name)
        .with_child(ConfigNode::new("mappings").with_child(mapping))
}

#[test]
fn test_tree_and_xml_build_the_same_model() {
    let tree = parser(
        "folia",
        word_mapping(
            ConfigNode::new("token")
                .with_child(ConfigNode::new("pre").with_child(item("name")))
                .with_child(
                    ConfigNode::new("post").with_child(item("text").with_attr("filter", "ascii,lowercase")),
                ),
        )
        .with_attr("offset", "ancestorGroup"),
    );
    let from_tree = MappingConfig::from_tree(&tree).unwrap();
    let from_xml = MappingConfig::from_xml_str(
        r#"<parser name="folia"><mappings>
             <mapping type="word" name="w" offset="ancestorGroup">
               <token><pre><item type="name"/></pre><post><item type="text" filter="ascii,lowercase"/></post></token>
             </mapping>
           </mappings></parser>"#,
    )
    .unwrap();

    assert_eq!(from_tree.format, DocumentFormat::Xml(XmlFlavor::Folia));
    assert_eq!(from_tree.xml, from_xml.xml);
    let a = from_tree.types.get(Category::Word, "w").unwrap();
    let b = from_xml.types.get(Category::Word, "w").unwrap();
    assert_eq!(a.rules, b.rules);
    assert_eq!(a.rules[0].offset, SourcePolicy::AncestorGroup);
    assert_eq!(a.rules[0].tokens[0].post[0].filters, vec![Filter::Ascii, Filter::Lowercase]);
}

#[test]
fn test_ancestor_items_carry_category_and_distance() {
    let tree = parser(
        "xml",
        word_mapping(
            ConfigNode::new("token")
                .with_child(ConfigNode::new("pre").with_child(item("ancestorGroupName").with_attr("distance", "1")))
                .with_child(
                    ConfigNode::new("post")
                        .with_child(item("ancestorRelationAnnotationAttribute").with_attr("name", "type")),
                ),
        ),
    );
    let config = MappingConfig::from_tree(&tree).unwrap();
    let token = &config.types.get(Category::Word, "w").unwrap().rules[0].tokens[0];
    assert_eq!(
        token.pre[0].source,
        ValueSource::Ancestor {
            category: Category::Group,
            distance: Some(1)
        }
    );
    assert_eq!(token.pre[0].kind, ValueKind::Name);
    assert_eq!(
        token.post[0].source,
        ValueSource::Ancestor {
            category: Category::RelationAnnotation,
            distance: None
        }
    );
}

#[test]
fn test_missing_parser_element() {
    let result = MappingConfig::from_tree(&ConfigNode::new("mtas"));
    assert!(matches!(result, Err(ConfigError::MissingElement { .. })));
}

#[test]
fn test_empty_pre_is_rejected() {
    let tree = parser(
        "xml",
        word_mapping(ConfigNode::new("token").with_child(ConfigNode::new("post").with_child(item("text")))),
    );
    assert!(matches!(
        MappingConfig::from_tree(&tree),
        Err(ConfigError::EmptyToken { .. })
    ));
}

#[test]
fn test_invalid_function_pattern() {
    let tree = ConfigNode::new("parser")
        .with_attr("name", "crm")
        .with_child(
            ConfigNode::new("functions").with_child(
                ConfigNode::new("function")
                    .with_attr("name", "pos")
                    .with_attr("column", "3")
                    .with_child(ConfigNode::new("value").with_attr("pattern", "([")),
            ),
        );
    assert!(matches!(
        MappingConfig::from_tree(&tree),
        Err(ConfigError::InvalidPattern { .. })
    ));
}

proptest! {
    #[test]
    fn prop_unknown_item_types_are_rejected(kind in "[a-z]{3,10}") {
        prop_assume!(!["name", "text", "string", "attribute", "ancestor"].iter().any(|k| kind.starts_with(k)));
        let tree = parser(
            "xml",
            word_mapping(ConfigNode::new("token").with_child(ConfigNode::new("pre").with_child(item(&kind)))),
        );
        let rejected = matches!(MappingConfig::from_tree(&tree), Err(ConfigError::UnknownItemType { .. }));
        prop_assert!(rejected);
    }
}
