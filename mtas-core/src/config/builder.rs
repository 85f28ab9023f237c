//! Build the immutable mapping model from a configuration tree
//!
//! Every structural problem in the configuration is reported here, so a
//! `MappingConfig` that builds is safe to hand to any lexer.

use super::tree::ConfigNode;
use crate::enums::{Category, DocumentFormat, SourcePolicy};
use crate::error::ConfigError;
use crate::filter::{split_filter_list, Filter};
use crate::mapping::*;
use regex::Regex;
use std::collections::HashMap;

pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// BUILDER
// ============================================================================

/// Turns a `<parser>` tree into a [`MappingConfig`].
pub struct MappingBuilder {
    named_filters: HashMap<String, Vec<Filter>>,
}

impl MappingConfig {
    /// Build from a tree whose root is, or contains, a `<parser>` element.
    pub fn from_tree(root: &ConfigNode) -> ConfigResult<Self> {
        let parser = root.find("parser").ok_or_else(|| ConfigError::MissingElement {
            element: "parser".to_string(),
        })?;
        MappingBuilder::new().build(parser)
    }

    /// Load mapping XML and build the model.
    pub fn from_xml_str(xml: &str) -> ConfigResult<Self> {
        Self::from_tree(&ConfigNode::from_xml_str(xml)?)
    }
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self {
            named_filters: HashMap::new(),
        }
    }

    pub fn build(mut self, parser: &ConfigNode) -> ConfigResult<MappingConfig> {
        let format = DocumentFormat::parse(parser.required_attr("name")?)?;
        let mut config = MappingConfig::new(format);

        config.autorepair = Self::flag(parser, "autorepair")?.unwrap_or(false);
        config.makeunique = Self::flag(parser, "makeunique")?.unwrap_or(false);
        if let Some(node) = parser.child("referenceDepth") {
            config.reference_depth = Self::number(node, "value")?;
        }

        self.build_xml_settings(parser, &mut config.xml)?;

        if let Some(filters) = parser.child("filters") {
            for filter in filters.children_named("filter") {
                let name = filter.required_attr("name")?.to_string();
                let chain = self.parse_filters(filter.required_attr("value")?)?;
                self.named_filters.insert(name, chain);
            }
        }

        if let Some(references) = parser.child("references") {
            for reference in references.children_named("reference") {
                config.types.insert(ParserType::reference(
                    reference.required_attr("name")?,
                    reference.required_attr("ref")?,
                ));
            }
        }

        if let Some(variables) = parser.child("variables") {
            for variable in variables.children_named("variable") {
                config.variables.push(self.build_variable(variable)?);
            }
        }

        if let Some(functions) = parser.child("functions") {
            for function in functions.children_named("function") {
                config.functions.push(Self::build_function(function)?);
            }
        }

        let mut ancestor_text = Vec::new();
        if let Some(mappings) = parser.child("mappings") {
            for mapping in mappings.children_named("mapping") {
                let name = mapping.required_attr("name")?;
                let rule = self.build_rule(mapping)?;
                ancestor_text.extend(rule.ancestor_text_categories());
                config.types.add_rule(name, rule);
            }
        }

        // Text read through an ancestor item or condition must be kept by
        // every type that can be that ancestor.
        for category in ancestor_text {
            config.types.mark_category_collect_text(category);
        }

        // Functions emit word annotations with text.
        let function_names: Vec<String> = config.functions.iter().map(|f| f.name.clone()).collect();
        for name in function_names {
            config.types.mark_collect_text(Category::WordAnnotation, &name);
        }

        Ok(config)
    }

    fn build_xml_settings(&self, parser: &ConfigNode, xml: &mut XmlSettings) -> ConfigResult<()> {
        if let Some(node) = parser.child("namespaceURI") {
            xml.namespace_uri = Self::optional_value(node);
        }
        if let Some(node) = parser.child("rootTag") {
            xml.root_tag = Self::optional_value(node);
        }
        let content: Vec<String> = parser
            .children_named("contentTag")
            .filter_map(Self::optional_value)
            .collect();
        if !content.is_empty() {
            xml.content_tags = content;
        }
        if let Some(node) = parser.child("idAttribute") {
            xml.id_attribute = AttributeKey {
                name: node.required_attr("name")?.to_string(),
                namespace: node.attr("namespace").map(str::to_string),
            };
        }
        Ok(())
    }

    fn optional_value(node: &ConfigNode) -> Option<String> {
        node.attr("value")
            .map(str::to_string)
            .or_else(|| Some(node.text.trim().to_string()))
            .filter(|v| !v.is_empty())
    }

    fn flag(parser: &ConfigNode, name: &str) -> ConfigResult<Option<bool>> {
        match parser.child(name) {
            None => Ok(None),
            Some(node) => Self::bool_attr(node, "value").map(Some),
        }
    }

    fn bool_attr(node: &ConfigNode, name: &str) -> ConfigResult<bool> {
        match node.required_attr(name)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                field: format!("{}.{}", node.name, name),
                value: other.to_string(),
                reason: "expected true or false".to_string(),
            }),
        }
    }

    fn optional_bool(node: &ConfigNode, name: &str, default: bool) -> ConfigResult<bool> {
        if node.attr(name).is_some() {
            Self::bool_attr(node, name)
        } else {
            Ok(default)
        }
    }

    fn number(node: &ConfigNode, name: &str) -> ConfigResult<usize> {
        let raw = node.required_attr(name)?;
        raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: format!("{}.{}", node.name, name),
            value: raw.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
    }

    fn optional_number(node: &ConfigNode, name: &str) -> ConfigResult<Option<usize>> {
        if node.attr(name).is_some() {
            Self::number(node, name).map(Some)
        } else {
            Ok(None)
        }
    }

    // ========================================================================
    // FILTERS
    // ========================================================================

    fn parse_filters(&self, list: &str) -> ConfigResult<Vec<Filter>> {
        let mut filters = Vec::new();
        for expr in split_filter_list(list) {
            match Filter::parse_builtin(expr)? {
                Some(filter) => filters.push(filter),
                None => match self.named_filters.get(expr) {
                    Some(chain) => filters.extend(chain.iter().cloned()),
                    None => {
                        return Err(ConfigError::UnknownFilter {
                            value: expr.to_string(),
                        })
                    }
                },
            }
        }
        if filters.contains(&Filter::Uppercase) && filters.contains(&Filter::Lowercase) {
            return Err(ConfigError::InvalidValue {
                field: "filter".to_string(),
                value: list.to_string(),
                reason: "uppercase and lowercase exclude each other".to_string(),
            });
        }
        Ok(filters)
    }

    // ========================================================================
    // MAPPINGS
    // ========================================================================

    fn build_rule(&self, mapping: &ConfigNode) -> ConfigResult<MappingRule> {
        let type_name = mapping.required_attr("type")?;
        let category = match Category::from_config_name(type_name) {
            Some(Category::Reference) | None => {
                return Err(ConfigError::UnknownMappingType {
                    value: type_name.to_string(),
                })
            }
            Some(category) => category,
        };
        let mapping_name = format!("{} {}", type_name, mapping.attr("name").unwrap_or(""));

        let mut rule = MappingRule::new(category);
        if let Some(policy) = mapping.attr("position") {
            rule.position = SourcePolicy::parse(policy)?;
        }
        if let Some(policy) = mapping.attr("offset") {
            rule.offset = SourcePolicy::parse(policy)?;
        }
        if let Some(policy) = mapping.attr("realoffset") {
            rule.real_offset = SourcePolicy::parse(policy)?;
        }
        match (mapping.attr("start"), mapping.attr("end")) {
            (Some(start), Some(end)) => {
                rule.local_reference = Some(LocalReferenceSpan {
                    start: start.to_string(),
                    end: end.to_string(),
                })
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::MissingAttribute {
                    element: "mapping".to_string(),
                    attribute: "start/end".to_string(),
                })
            }
        }

        for conditions in mapping.children_named("condition") {
            for item in conditions.children_named("item") {
                rule.conditions.push(Self::build_condition(item, category)?);
            }
        }

        for token in mapping.children_named("token") {
            rule.tokens
                .push(self.build_token(token, category, &mapping_name)?);
        }

        Ok(rule)
    }

    fn build_token(
        &self,
        token: &ConfigNode,
        category: Category,
        mapping_name: &str,
    ) -> ConfigResult<MappingToken> {
        if let Some(kind) = token.attr("type") {
            if kind != "string" {
                return Err(ConfigError::UnknownItemType {
                    context: "token".to_string(),
                    value: kind.to_string(),
                });
            }
        }
        let pre = self.build_items(token.child("pre"), category)?;
        if pre.is_empty() {
            return Err(ConfigError::EmptyToken {
                mapping: mapping_name.to_string(),
            });
        }
        Ok(MappingToken {
            category,
            offset: Self::optional_bool(token, "offset", true)?,
            real_offset: Self::optional_bool(token, "realoffset", true)?,
            parent: Self::optional_bool(token, "parent", true)?,
            pre,
            post: self.build_items(token.child("post"), category)?,
            payload: self.build_items(token.child("payload"), category)?,
        })
    }

    fn build_items(&self, list: Option<&ConfigNode>, category: Category) -> ConfigResult<Vec<ValueItem>> {
        match list {
            None => Ok(Vec::new()),
            Some(list) => list
                .children_named("item")
                .map(|item| self.build_item(item, category))
                .collect(),
        }
    }

    /// Build one value item. `category` resolves `ancestorName` and friends.
    pub fn build_item(&self, item: &ConfigNode, category: Category) -> ConfigResult<ValueItem> {
        let item_type = item.required_attr("type")?;
        let unknown = || ConfigError::UnknownItemType {
            context: "value".to_string(),
            value: item_type.to_string(),
        };
        let attribute = || -> ConfigResult<ValueKind> {
            Ok(ValueKind::Attribute {
                name: item.required_attr("name")?.to_string(),
                namespace: item.attr("namespace").map(str::to_string),
            })
        };

        let (source, kind) = match item_type {
            "name" => (ValueSource::OwnObject, ValueKind::Name),
            "attribute" => (ValueSource::OwnObject, attribute()?),
            "text" => (ValueSource::OwnObject, ValueKind::Text),
            "textSplit" => (
                ValueSource::OwnObject,
                ValueKind::TextSplit {
                    delimiter: item.required_attr("split")?.to_string(),
                    selection: None,
                },
            ),
            "string" => (
                ValueSource::Literal,
                ValueKind::Literal(item.attr("value").unwrap_or_default().to_string()),
            ),
            "variableFromAttribute" => (
                ValueSource::Variable,
                ValueKind::Variable {
                    name: item.required_attr("name")?.to_string(),
                    source_attribute: item.required_attr("value")?.to_string(),
                },
            ),
            other => {
                let rest = other.strip_prefix("ancestor").ok_or_else(unknown)?;
                let (category_name, kind) = if let Some(c) = rest.strip_suffix("Name") {
                    (c, ValueKind::Name)
                } else if let Some(c) = rest.strip_suffix("Attribute") {
                    (c, attribute()?)
                } else if let Some(c) = rest.strip_suffix("Text") {
                    (c, ValueKind::Text)
                } else {
                    return Err(unknown());
                };
                let ancestor = if category_name.is_empty() {
                    category
                } else {
                    Category::from_item_name(category_name).ok_or_else(unknown)?
                };
                (
                    ValueSource::Ancestor {
                        category: ancestor,
                        distance: Self::optional_number(item, "distance")?,
                    },
                    kind,
                )
            }
        };

        let mut value = ValueItem::new(source, kind);
        value.prefix = item.attr("prefix").map(str::to_string);
        if let Some(list) = item.attr("filter") {
            let filters = self.parse_filters(list)?;
            for filter in filters {
                match filter {
                    Filter::SplitSelect(selection) => match &mut value.kind {
                        ValueKind::TextSplit {
                            selection: slot, ..
                        } => *slot = Some(selection),
                        _ => {
                            return Err(ConfigError::SplitFilterOnNonSplit {
                                item: item_type.to_string(),
                                filter: list.to_string(),
                            })
                        }
                    },
                    other => value.filters.push(other),
                }
            }
        }
        Ok(value)
    }

    // ========================================================================
    // CONDITIONS
    // ========================================================================

    fn build_condition(item: &ConfigNode, category: Category) -> ConfigResult<Condition> {
        let item_type = item.required_attr("type")?;
        let unknown = || ConfigError::UnknownItemType {
            context: "condition".to_string(),
            value: item_type.to_string(),
        };
        let negate = Self::optional_bool(item, "not", false)?;
        let expected = item.attr("condition").map(str::to_string);
        let attribute = || -> ConfigResult<ConditionKind> {
            Ok(ConditionKind::AttributeEquals {
                name: item.required_attr("name")?.to_string(),
                namespace: item.attr("namespace").map(str::to_string),
            })
        };

        let (kind, target) = match item_type {
            "unknownAncestor" => (
                ConditionKind::UnknownAncestorCountEquals {
                    count: Self::number(item, "number")?,
                },
                ConditionTarget::OwnObject,
            ),
            "name" => (ConditionKind::NameEquals, ConditionTarget::OwnObject),
            "attribute" => (attribute()?, ConditionTarget::OwnObject),
            "text" => (ConditionKind::TextEquals, ConditionTarget::OwnObject),
            other => {
                let rest = other.strip_prefix("ancestor").ok_or_else(unknown)?;
                let (category_name, kind) = if let Some(c) = rest.strip_suffix("Name") {
                    (c, Some(ConditionKind::NameEquals))
                } else if let Some(c) = rest.strip_suffix("Attribute") {
                    (c, Some(attribute()?))
                } else if let Some(c) = rest.strip_suffix("Text") {
                    (c, Some(ConditionKind::TextEquals))
                } else {
                    (rest, None)
                };
                let ancestor = if category_name.is_empty() {
                    category
                } else {
                    Category::from_item_name(category_name).ok_or_else(unknown)?
                };
                match kind {
                    Some(kind) => (
                        kind,
                        ConditionTarget::Ancestor {
                            category: ancestor,
                            distance: Self::optional_number(item, "distance")?,
                        },
                    ),
                    None => (
                        ConditionKind::AncestorCountEquals {
                            category: ancestor,
                            count: Self::number(item, "number")?,
                        },
                        ConditionTarget::OwnObject,
                    ),
                }
            }
        };

        Ok(Condition {
            kind,
            target,
            expected,
            negate,
        })
    }

    // ========================================================================
    // VARIABLES AND FUNCTIONS
    // ========================================================================

    fn build_variable(&self, variable: &ConfigNode) -> ConfigResult<VariableDeclaration> {
        let name = variable.required_attr("name")?.to_string();
        let id_attribute = variable.required_attr("value")?.to_string();
        let mut values = Vec::new();
        for list in variable.children_named("value") {
            for item in list.children_named("item") {
                let value = self.build_item(item, Category::Group)?;
                if !matches!(value.source, ValueSource::OwnObject | ValueSource::Literal) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("variable {}", name),
                        value: item.attr("type").unwrap_or_default().to_string(),
                        reason: "variables only read their own element or literals".to_string(),
                    });
                }
                values.push(value);
            }
        }
        if values.is_empty() {
            return Err(ConfigError::MissingElement {
                element: format!("variable {} value", name),
            });
        }
        Ok(VariableDeclaration {
            name,
            id_attribute,
            values,
        })
    }

    fn build_function(function: &ConfigNode) -> ConfigResult<CrmFunction> {
        let mut rules = Vec::new();
        for value in function.children_named("value") {
            let pattern = value.required_attr("pattern")?;
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            rules.push(FunctionRule {
                pattern: regex,
                output: value.attr("output").unwrap_or("$0").to_string(),
            });
        }
        Ok(CrmFunction {
            name: function.required_attr("name")?.to_string(),
            column: Self::number(function, "column")?,
            rules,
        })
    }
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::XmlFlavor;

    const CONFIG: &str = r#"
        <mtas>
          <parser name="tei">
            <autorepair value="true"/>
            <makeunique value="false"/>
            <referenceDepth value="4"/>
            <filters><filter name="norm" value="lowercase,ascii"/></filters>
            <references><reference name="ptr" ref="target"/></references>
            <variables>
              <variable name="person" value="id">
                <value><item type="attribute" name="label"/></value>
              </variable>
            </variables>
            <mappings>
              <mapping type="word" name="w">
                <token type="string" offset="true" realoffset="false" parent="true">
                  <pre><item type="name"/></pre>
                  <post><item type="text" filter="norm"/></post>
                  <payload><item type="attribute" name="conf"/></payload>
                </token>
                <condition>
                  <item type="ancestorGroup" number="1"/>
                  <item type="attribute" name="type" condition="punct" not="true"/>
                </condition>
              </mapping>
              <mapping type="group" name="s" offset="ancestorGroup" start="from" end="to">
                <token>
                  <pre><item type="ancestorGroupAttribute" name="n" distance="0" prefix="p:"/></pre>
                  <post><item type="textSplit" split="|" filter="split(0,2-3),uppercase"/></post>
                </token>
              </mapping>
            </mappings>
          </parser>
        </mtas>"#;

    #[test]
    fn test_build_full_config() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        assert_eq!(config.format, DocumentFormat::Xml(XmlFlavor::Tei));
        assert!(config.autorepair);
        assert!(!config.makeunique);
        assert_eq!(config.reference_depth, 4);
        assert_eq!(config.xml.root_tag.as_deref(), Some("TEI"));
        assert_eq!(
            config.types.get(Category::Reference, "ptr").unwrap().reference_attribute.as_deref(),
            Some("target")
        );
        assert_eq!(config.variable("person").unwrap().id_attribute, "id");

        let word = config.types.get(Category::Word, "w").unwrap();
        let rule = &word.rules[0];
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(
            rule.conditions[0].kind,
            ConditionKind::AncestorCountEquals {
                category: Category::Group,
                count: 1
            }
        );
        assert!(rule.conditions[1].negate);
        let token = &rule.tokens[0];
        assert!(!token.real_offset);
        assert_eq!(token.post[0].filters, vec![Filter::Lowercase, Filter::Ascii]);
        assert_eq!(token.payload.len(), 1);

        let group = config.types.get(Category::Group, "s").unwrap();
        let rule = &group.rules[0];
        assert_eq!(rule.offset, SourcePolicy::AncestorGroup);
        assert_eq!(rule.local_reference.as_ref().unwrap().start, "from");
        let pre = &rule.tokens[0].pre[0];
        assert_eq!(
            pre.source,
            ValueSource::Ancestor {
                category: Category::Group,
                distance: Some(0)
            }
        );
        assert_eq!(pre.prefix.as_deref(), Some("p:"));
        match &rule.tokens[0].post[0].kind {
            ValueKind::TextSplit { delimiter, selection } => {
                assert_eq!(delimiter, "|");
                assert!(selection.as_ref().unwrap().contains(3));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(group.collect_text);
    }

    #[test]
    fn test_ancestor_text_marks_ancestor_types() {
        let xml = r#"<parser name="xml"><mappings>
            <mapping type="group" name="s"><token><pre><item type="name"/></pre></token></mapping>
            <mapping type="group" name="p"><token><pre><item type="name"/></pre></token></mapping>
            <mapping type="relation" name="link"><token><pre><item type="name"/></pre></token></mapping>
            <mapping type="word" name="w">
              <token><pre><item type="name"/></pre><post><item type="ancestorGroupText"/></post></token>
            </mapping>
            <mapping type="group" name="q">
              <token><pre><item type="name"/></pre></token>
              <condition><item type="ancestorRelationText" condition="x"/></condition>
            </mapping>
            </mappings></parser>"#;
        let config = MappingConfig::from_xml_str(xml).unwrap();
        for name in ["s", "p", "q"] {
            assert!(config.types.get(Category::Group, name).unwrap().collect_text, "{}", name);
        }
        assert!(config.types.get(Category::Relation, "link").unwrap().collect_text);
        assert!(!config.types.get(Category::Group, "q").unwrap().precheck_text);
    }

    #[test]
    fn test_split_filter_on_text_is_rejected() {
        let xml = r#"<parser name="xml"><mappings><mapping type="word" name="w">
            <token><pre><item type="text" filter="split(0)"/></pre></token>
            </mapping></mappings></parser>"#;
        assert!(matches!(
            MappingConfig::from_xml_str(xml),
            Err(ConfigError::SplitFilterOnNonSplit { .. })
        ));
    }

    #[test]
    fn test_unknown_things_are_fatal() {
        let cases = [
            (
                r#"<parser name="xml"><mappings><mapping type="sentence" name="s"/></mappings></parser>"#,
                "mapping type",
            ),
            (
                r#"<parser name="xml"><mappings><mapping type="word" name="w" position="sibling"/></mappings></parser>"#,
                "source",
            ),
            (
                r#"<parser name="xml"><mappings><mapping type="word" name="w"><token><pre><item type="text" filter="reverse"/></pre></token></mapping></mappings></parser>"#,
                "filter",
            ),
            (
                r#"<parser name="xml"><mappings><mapping type="word" name="w"><token><pre><item type="ancestorSentenceName"/></pre></token></mapping></mappings></parser>"#,
                "item",
            ),
            (
                r#"<parser name="xml"><mappings><mapping type="word" name="w"><token><post><item type="text"/></post></token></mapping></mappings></parser>"#,
                "empty token",
            ),
            (r#"<parser name="docx"/>"#, "format"),
        ];
        for (xml, what) in cases {
            assert!(MappingConfig::from_xml_str(xml).is_err(), "expected {} error", what);
        }
    }

    #[test]
    fn test_conflicting_case_filters() {
        let xml = r#"<parser name="xml">
            <filters><filter name="up" value="uppercase"/></filters>
            <mappings><mapping type="word" name="w">
            <token><pre><item type="text" filter="up,ascii,lowercase"/></pre></token>
            </mapping></mappings></parser>"#;
        assert!(matches!(
            MappingConfig::from_xml_str(xml),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "filter"
        ));
    }

    #[test]
    fn test_function_table() {
        let xml = r#"<parser name="crm"><functions>
            <function name="pos" column="3"><value pattern="^1" output="noun"/></function>
            </functions></parser>"#;
        let config = MappingConfig::from_xml_str(xml).unwrap();
        assert_eq!(config.functions[0].apply("101").as_deref(), Some("noun"));

        let bad = r#"<parser name="crm"><functions>
            <function name="pos" column="3"><value pattern="(" output="x"/></function>
            </functions></parser>"#;
        assert!(matches!(
            MappingConfig::from_xml_str(bad),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_programmatic_tree() {
        let tree = ConfigNode::new("parser").with_attr("name", "sketch").with_child(
            ConfigNode::new("mappings").with_child(
                ConfigNode::new("mapping")
                    .with_attr("type", "word")
                    .with_attr("name", "word")
                    .with_child(ConfigNode::new("token").with_child(
                        ConfigNode::new("pre").with_child(ConfigNode::new("item").with_attr("type", "name")),
                    )),
            ),
        );
        let config = MappingConfig::from_tree(&tree).unwrap();
        assert_eq!(config.format, DocumentFormat::Sketch);
        assert_eq!(config.types.len(), 1);
    }
}
