//! Enumerations shared by the mapping model and the parser

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a structural element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Word,
    WordAnnotation,
    Group,
    GroupAnnotation,
    Relation,
    RelationAnnotation,
    Reference,
}

impl Category {
    /// Lookup order used by lexers when a tag matches several categories.
    pub const ALL: [Category; 7] = [
        Category::Word,
        Category::WordAnnotation,
        Category::Group,
        Category::GroupAnnotation,
        Category::Relation,
        Category::RelationAnnotation,
        Category::Reference,
    ];

    /// Categories that own a stack of open objects.
    pub const STRUCTURAL: [Category; 6] = [
        Category::Word,
        Category::WordAnnotation,
        Category::Group,
        Category::GroupAnnotation,
        Category::Relation,
        Category::RelationAnnotation,
    ];

    /// Name used in `<mapping type="...">`.
    pub fn config_name(self) -> &'static str {
        match self {
            Category::Word => "word",
            Category::WordAnnotation => "wordAnnotation",
            Category::Group => "group",
            Category::GroupAnnotation => "groupAnnotation",
            Category::Relation => "relation",
            Category::RelationAnnotation => "relationAnnotation",
            Category::Reference => "reference",
        }
    }

    /// Capitalised form used inside item types such as `ancestorGroupName`.
    pub fn item_name(self) -> &'static str {
        match self {
            Category::Word => "Word",
            Category::WordAnnotation => "WordAnnotation",
            Category::Group => "Group",
            Category::GroupAnnotation => "GroupAnnotation",
            Category::Relation => "Relation",
            Category::RelationAnnotation => "RelationAnnotation",
            Category::Reference => "Reference",
        }
    }

    pub fn from_config_name(value: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.config_name() == value)
    }

    pub fn from_item_name(value: &str) -> Option<Self> {
        Category::STRUCTURAL
            .into_iter()
            .find(|c| c.item_name() == value)
    }

    /// Index into per-category stacks; `None` for references.
    pub fn stack_index(self) -> Option<usize> {
        Category::STRUCTURAL.iter().position(|c| *c == self)
    }

    /// The category an annotation category annotates.
    pub fn annotated(self) -> Option<Category> {
        match self {
            Category::WordAnnotation => Some(Category::Word),
            Category::GroupAnnotation => Some(Category::Group),
            Category::RelationAnnotation => Some(Category::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// Where a token takes its position, offset or real offset from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SourcePolicy {
    #[default]
    OwnObject,
    AncestorGroup,
    AncestorWord,
    AncestorRelation,
    AncestorGroupAnnotation,
    AncestorWordAnnotation,
    AncestorRelationAnnotation,
    ByReference,
}

impl SourcePolicy {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        Ok(match value {
            "own" => SourcePolicy::OwnObject,
            "ancestorGroup" => SourcePolicy::AncestorGroup,
            "ancestorWord" => SourcePolicy::AncestorWord,
            "ancestorRelation" => SourcePolicy::AncestorRelation,
            "ancestorGroupAnnotation" => SourcePolicy::AncestorGroupAnnotation,
            "ancestorWordAnnotation" => SourcePolicy::AncestorWordAnnotation,
            "ancestorRelationAnnotation" => SourcePolicy::AncestorRelationAnnotation,
            "reference" => SourcePolicy::ByReference,
            _ => {
                return Err(ConfigError::UnknownSource {
                    value: value.to_string(),
                })
            }
        })
    }

    /// Ancestor category for the `Ancestor*` policies.
    pub fn ancestor_category(self) -> Option<Category> {
        match self {
            SourcePolicy::AncestorGroup => Some(Category::Group),
            SourcePolicy::AncestorWord => Some(Category::Word),
            SourcePolicy::AncestorRelation => Some(Category::Relation),
            SourcePolicy::AncestorGroupAnnotation => Some(Category::GroupAnnotation),
            SourcePolicy::AncestorWordAnnotation => Some(Category::WordAnnotation),
            SourcePolicy::AncestorRelationAnnotation => Some(Category::RelationAnnotation),
            SourcePolicy::OwnObject | SourcePolicy::ByReference => None,
        }
    }
}

/// XML dialects sharing the streaming XML lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XmlFlavor {
    Generic,
    Tei,
    Folia,
    Chat,
    Elan,
}

/// Concrete source format a configuration is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Xml(XmlFlavor),
    Crm,
    Sketch,
    Penn,
}

impl DocumentFormat {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "xml" => DocumentFormat::Xml(XmlFlavor::Generic),
            "tei" => DocumentFormat::Xml(XmlFlavor::Tei),
            "folia" => DocumentFormat::Xml(XmlFlavor::Folia),
            "chat" => DocumentFormat::Xml(XmlFlavor::Chat),
            "elan" => DocumentFormat::Xml(XmlFlavor::Elan),
            "crm" => DocumentFormat::Crm,
            "sketch" => DocumentFormat::Sketch,
            "penn" | "penntreebank" => DocumentFormat::Penn,
            _ => {
                return Err(ConfigError::UnknownFormat {
                    value: value.to_string(),
                })
            }
        })
    }
}
