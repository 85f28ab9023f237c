//! Generic attributed configuration tree

use crate::error::ConfigError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configuration element: name, attributes, children and text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<ConfigNode>,
    pub text: String,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute that must be present and non-empty.
    pub fn required_attr(&self, name: &str) -> Result<&str, ConfigError> {
        match self.attr(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingAttribute {
                element: self.name.clone(),
                attribute: name.to_string(),
            }),
        }
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for the first element with the given name, self included.
    pub fn find(&self, name: &str) -> Option<&ConfigNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Load a tree from mapping XML.
    pub fn from_xml_str(xml: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<ConfigNode> = Vec::new();
        let mut root: Option<ConfigNode> = None;

        loop {
            let event = reader.read_event().map_err(|e| ConfigError::Xml {
                position: reader.error_position() as usize,
                reason: e.to_string(),
            })?;
            match event {
                Event::Start(start) => {
                    stack.push(Self::node_from_start(&reader, &start)?);
                }
                Event::Empty(start) => {
                    let node = Self::node_from_start(&reader, &start)?;
                    Self::attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    if let Some(node) = stack.pop() {
                        Self::attach(&mut stack, &mut root, node);
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| ConfigError::Xml {
                            position: reader.buffer_position() as usize,
                            reason: e.to_string(),
                        })?;
                        node.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| ConfigError::MissingElement {
            element: "root".to_string(),
        })
    }

    fn node_from_start(
        reader: &Reader<&[u8]>,
        start: &quick_xml::events::BytesStart<'_>,
    ) -> Result<ConfigNode, ConfigError> {
        let xml_error = |reason: String| ConfigError::Xml {
            position: reader.buffer_position() as usize,
            reason,
        };
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut node = ConfigNode::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| xml_error(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| xml_error(e.to_string()))?
                .into_owned();
            node.attributes.insert(key, value);
        }
        Ok(node)
    }

    fn attach(stack: &mut [ConfigNode], root: &mut Option<ConfigNode>, node: ConfigNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => {
                if root.is_none() {
                    *root = Some(node);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_xml_str_builds_tree() {
        let tree = ConfigNode::from_xml_str(
            r#"<?xml version="1.0"?>
            <mtas>
              <parser name="xml">
                <mappings>
                  <mapping type="word" name="w"/>
                  <mapping type="group" name="s">note &amp; more</mapping>
                </mappings>
              </parser>
            </mtas>"#,
        )
        .unwrap();
        assert_eq!(tree.name, "mtas");
        let parser = tree.find("parser").unwrap();
        assert_eq!(parser.attr("name"), Some("xml"));
        let mappings: Vec<_> = parser
            .child("mappings")
            .unwrap()
            .children_named("mapping")
            .collect();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[1].text, "note & more");
    }

    #[test]
    fn test_required_attr() {
        let node = ConfigNode::new("mapping").with_attr("type", "word").with_attr("name", "");
        assert_eq!(node.required_attr("type").unwrap(), "word");
        assert!(matches!(
            node.required_attr("name"),
            Err(ConfigError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_malformed_xml_is_config_error() {
        let err = ConfigNode::from_xml_str("<parser><mappings></parser>").unwrap_err();
        assert!(matches!(err, ConfigError::Xml { .. }));
    }
}
