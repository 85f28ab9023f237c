//! Static mapping model
//!
//! Built once from configuration and shared read-only by every parse.

use crate::enums::{Category, DocumentFormat, SourcePolicy, XmlFlavor};
use crate::filter::{Filter, IndexSelection};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default bound on reference chain recursion.
///
/// Chains deeper than this are treated as unresolvable, which also stops
/// cyclic reference graphs.
pub const DEFAULT_REFERENCE_DEPTH: usize = 10;

// ============================================================================
// VALUE ITEMS
// ============================================================================

/// Where a value item reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    OwnObject,
    /// `distance: None` selects every open ancestor of the category.
    Ancestor {
        category: Category,
        distance: Option<usize>,
    },
    Literal,
    Variable,
}

/// What a value item reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Name,
    Attribute {
        name: String,
        namespace: Option<String>,
    },
    Text,
    TextSplit {
        delimiter: String,
        selection: Option<IndexSelection>,
    },
    Literal(String),
    Variable {
        name: String,
        source_attribute: String,
    },
}

/// One configured value expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueItem {
    pub source: ValueSource,
    pub kind: ValueKind,
    /// Case and ASCII filters; split selections live on `ValueKind::TextSplit`.
    pub filters: Vec<Filter>,
    pub prefix: Option<String>,
}

impl ValueItem {
    pub fn new(source: ValueSource, kind: ValueKind) -> Self {
        Self {
            source,
            kind,
            filters: Vec::new(),
            prefix: None,
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(ValueSource::Literal, ValueKind::Literal(text.into()))
    }

    pub fn own(kind: ValueKind) -> Self {
        Self::new(ValueSource::OwnObject, kind)
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn uses_text(&self) -> bool {
        matches!(self.kind, ValueKind::Text | ValueKind::TextSplit { .. })
    }
}

// ============================================================================
// CONDITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    AncestorCountEquals { category: Category, count: usize },
    UnknownAncestorCountEquals { count: usize },
    NameEquals,
    AttributeEquals {
        name: String,
        namespace: Option<String>,
    },
    TextEquals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionTarget {
    OwnObject,
    Ancestor {
        category: Category,
        distance: Option<usize>,
    },
}

/// A gate on a mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub target: ConditionTarget,
    /// `None` means the value only has to be present.
    pub expected: Option<String>,
    pub negate: bool,
}

impl Condition {
    /// Gates on the object's own text, which is only known at close.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ConditionKind::TextEquals) && self.target == ConditionTarget::OwnObject
    }

    /// Category whose text this condition reads from an open ancestor.
    pub fn ancestor_text_category(&self) -> Option<Category> {
        match (&self.kind, &self.target) {
            (ConditionKind::TextEquals, ConditionTarget::Ancestor { category, .. }) => Some(*category),
            _ => None,
        }
    }
}

// ============================================================================
// RULES AND TYPES
// ============================================================================

/// A token template inside a mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingToken {
    pub category: Category,
    pub offset: bool,
    pub real_offset: bool,
    pub parent: bool,
    pub pre: Vec<ValueItem>,
    pub post: Vec<ValueItem>,
    pub payload: Vec<ValueItem>,
}

impl MappingToken {
    fn items(&self) -> impl Iterator<Item = &ValueItem> {
        self.pre.iter().chain(self.post.iter()).chain(self.payload.iter())
    }
}

/// Attribute pair naming an in-document span, e.g. `start="#a" end="#b"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalReferenceSpan {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub category: Category,
    pub position: SourcePolicy,
    pub offset: SourcePolicy,
    pub real_offset: SourcePolicy,
    pub local_reference: Option<LocalReferenceSpan>,
    pub conditions: Vec<Condition>,
    pub tokens: Vec<MappingToken>,
}

impl MappingRule {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            position: SourcePolicy::OwnObject,
            offset: SourcePolicy::OwnObject,
            real_offset: SourcePolicy::OwnObject,
            local_reference: None,
            conditions: Vec::new(),
            tokens: Vec::new(),
        }
    }

    pub fn uses_text(&self) -> bool {
        self.conditions.iter().any(Condition::is_text)
            || self
                .tokens
                .iter()
                .flat_map(MappingToken::items)
                .any(|item| item.uses_text() && item.source == ValueSource::OwnObject)
    }

    /// Categories whose open objects must keep their text for this rule.
    pub fn ancestor_text_categories(&self) -> Vec<Category> {
        let from_items = self.tokens.iter().flat_map(MappingToken::items).filter_map(|item| {
            match item.source {
                ValueSource::Ancestor { category, .. } if item.uses_text() => Some(category),
                _ => None,
            }
        });
        let mut categories: Vec<Category> = self
            .conditions
            .iter()
            .filter_map(Condition::ancestor_text_category)
            .chain(from_items)
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// A configured element type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserType {
    pub name: String,
    pub category: Category,
    pub rules: Vec<MappingRule>,
    /// Some rule gates on the object's own text, checked again at close.
    pub precheck_text: bool,
    /// Objects of this type accumulate text.
    pub collect_text: bool,
    pub reference_attribute: Option<String>,
}

impl ParserType {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            rules: Vec::new(),
            precheck_text: false,
            collect_text: category == Category::Word,
            reference_attribute: None,
        }
    }

    pub fn reference(name: impl Into<String>, attribute: impl Into<String>) -> Self {
        let mut ptype = Self::new(name, Category::Reference);
        ptype.reference_attribute = Some(attribute.into());
        ptype
    }

    pub fn add_rule(&mut self, rule: MappingRule) {
        self.precheck_text |= rule.conditions.iter().any(Condition::is_text);
        self.collect_text |= rule.uses_text();
        self.rules.push(rule);
    }
}

/// Lookup table `(category, name)` → type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRegistry {
    types: HashMap<(Category, String), ParserType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category, name: &str) -> Option<&ParserType> {
        self.types.get(&(category, name.to_string()))
    }

    /// Add a rule, creating the type on first use.
    pub fn add_rule(&mut self, name: &str, rule: MappingRule) {
        let category = rule.category;
        self.types
            .entry((category, name.to_string()))
            .or_insert_with(|| ParserType::new(name, category))
            .add_rule(rule);
    }

    pub fn insert(&mut self, ptype: ParserType) {
        self.types
            .insert((ptype.category, ptype.name.clone()), ptype);
    }

    pub fn mark_collect_text(&mut self, category: Category, name: &str) {
        if let Some(ptype) = self.types.get_mut(&(category, name.to_string())) {
            ptype.collect_text = true;
        }
    }

    /// Make every type of a category accumulate text.
    pub fn mark_category_collect_text(&mut self, category: Category) {
        for ptype in self.types.values_mut().filter(|t| t.category == category) {
            ptype.collect_text = true;
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParserType> {
        self.types.values()
    }
}

// ============================================================================
// FORMAT SETTINGS
// ============================================================================

/// A variable table declaration: elements named `name` store the computed
/// `values` under the id found in `id_attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: String,
    pub id_attribute: String,
    pub values: Vec<ValueItem>,
}

/// Qualified attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKey {
    pub name: String,
    pub namespace: Option<String>,
}

impl AttributeKey {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlSettings {
    pub namespace_uri: Option<String>,
    pub root_tag: Option<String>,
    pub content_tags: Vec<String>,
    pub id_attribute: AttributeKey,
}

impl XmlSettings {
    pub fn for_flavor(flavor: XmlFlavor) -> Self {
        let xml_id = AttributeKey {
            name: "id".to_string(),
            namespace: Some(XML_NAMESPACE.to_string()),
        };
        match flavor {
            XmlFlavor::Generic => Self {
                namespace_uri: None,
                root_tag: None,
                content_tags: Vec::new(),
                id_attribute: AttributeKey::plain("id"),
            },
            XmlFlavor::Tei => Self {
                namespace_uri: Some("http://www.tei-c.org/ns/1.0".to_string()),
                root_tag: Some("TEI".to_string()),
                content_tags: vec!["text".to_string()],
                id_attribute: xml_id,
            },
            XmlFlavor::Folia => Self {
                namespace_uri: Some("http://ilk.uvt.nl/folia".to_string()),
                root_tag: Some("FoLiA".to_string()),
                content_tags: vec!["text".to_string()],
                id_attribute: xml_id,
            },
            XmlFlavor::Chat => Self {
                namespace_uri: Some("http://www.talkbank.org/ns/talkbank".to_string()),
                root_tag: Some("CHAT".to_string()),
                content_tags: Vec::new(),
                id_attribute: AttributeKey::plain("uID"),
            },
            XmlFlavor::Elan => Self {
                namespace_uri: None,
                root_tag: Some("ANNOTATION_DOCUMENT".to_string()),
                content_tags: Vec::new(),
                id_attribute: AttributeKey::plain("ANNOTATION_ID"),
            },
        }
    }
}

/// One row of a CRM function table.
#[derive(Debug, Clone)]
pub struct FunctionRule {
    pub pattern: Regex,
    pub output: String,
}

/// Maps a CRM column through a regex table into a word annotation named `name`.
#[derive(Debug, Clone)]
pub struct CrmFunction {
    pub name: String,
    pub column: usize,
    pub rules: Vec<FunctionRule>,
}

impl CrmFunction {
    /// First matching rule wins; `$n` groups are expanded into the output.
    pub fn apply(&self, value: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            rule.pattern.captures(value).map(|caps| {
                let mut output = String::new();
                caps.expand(&rule.output, &mut output);
                output
            })
        })
    }
}

// ============================================================================
// MAPPING CONFIG
// ============================================================================

/// The complete immutable model for one source format.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    pub format: DocumentFormat,
    pub autorepair: bool,
    pub makeunique: bool,
    pub reference_depth: usize,
    pub types: TypeRegistry,
    pub variables: Vec<VariableDeclaration>,
    pub xml: XmlSettings,
    pub functions: Vec<CrmFunction>,
}

impl MappingConfig {
    pub fn new(format: DocumentFormat) -> Self {
        let flavor = match format {
            DocumentFormat::Xml(flavor) => flavor,
            _ => XmlFlavor::Generic,
        };
        Self {
            format,
            autorepair: false,
            makeunique: false,
            reference_depth: DEFAULT_REFERENCE_DEPTH,
            types: TypeRegistry::new(),
            variables: Vec::new(),
            xml: XmlSettings::for_flavor(flavor),
            functions: Vec::new(),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDeclaration> {
        self.variables.iter().find(|v| v.name == name)
    }
}
