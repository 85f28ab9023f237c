//! Streaming XML lexer (generic XML, TEI, FoLiA, CHAT, ELAN)

use super::{CharCounter, DocumentLexer};
use crate::object::{ParserObject, VariableElement};
use crate::session::ParseSession;
use mtas_core::{Category, MappingConfig, MtasResult, OffsetRange, ParseError, TokenCollection, XML_NAMESPACE};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::collections::HashMap;

pub struct XmlLexer<'c> {
    config: &'c MappingConfig,
}

/// What an open XML element turned into.
#[derive(Debug)]
struct Frame {
    name: String,
    object: Option<Category>,
    unknown: bool,
    variable: bool,
    content: bool,
}

#[derive(Debug, Default)]
struct Attributes {
    plain: HashMap<String, String>,
    namespaced: HashMap<String, HashMap<String, String>>,
}

fn namespace_of(result: ResolveResult<'_>) -> Option<String> {
    match result {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Some(XML_NAMESPACE.to_string()),
        _ => None,
    }
}

impl<'c> XmlLexer<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    fn read_attributes(reader: &NsReader<&[u8]>, start: &BytesStart<'_>) -> Result<Attributes, ParseError> {
        let position = reader.buffer_position() as usize;
        let xml_error = |reason: String| ParseError::Xml { position, reason };
        let mut attributes = Attributes::default();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| xml_error(e.to_string()))?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = attr
                .unescape_value()
                .map_err(|e| xml_error(e.to_string()))?
                .into_owned();
            let (resolved, local) = reader.resolve_attribute(attr.key);
            let local = String::from_utf8_lossy(local.as_ref()).into_owned();
            match resolved {
                ResolveResult::Unknown(ref prefix) if prefix.as_slice() != b"xml" => {
                    let qualified = String::from_utf8_lossy(key).into_owned();
                    attributes.plain.insert(qualified, value);
                }
                other => match namespace_of(other) {
                    Some(ns) => {
                        attributes.namespaced.entry(ns).or_default().insert(local, value);
                    }
                    None => {
                        attributes.plain.insert(local, value);
                    }
                },
            }
        }
        Ok(attributes)
    }

    /// Open one element. Returns the frame to close it with later.
    #[allow(clippy::too_many_arguments)]
    fn open_element(
        &self,
        session: &mut ParseSession<'c>,
        name: String,
        namespace: Option<String>,
        attributes: Attributes,
        mapping_active: bool,
        offset: OffsetRange,
        real_offset: OffsetRange,
    ) -> Frame {
        let mut frame = Frame {
            content: self.config.xml.content_tags.iter().any(|t| *t == name),
            name,
            object: None,
            unknown: false,
            variable: false,
        };

        if let Some(declaration) = session.variable_declaration(&frame.name) {
            session.open_variable(
                declaration,
                VariableElement {
                    name: frame.name.clone(),
                    attributes: attributes.plain.clone(),
                    ns_attributes: attributes.namespaced.clone(),
                    text: String::new(),
                },
            );
            frame.variable = true;
        }

        let namespace_ok = match &self.config.xml.namespace_uri {
            Some(uri) => namespace.as_deref() == Some(uri.as_str()),
            None => true,
        };
        if !mapping_active || frame.content || !namespace_ok {
            return frame;
        }

        let Some(ptype) = session.lookup_type(&frame.name) else {
            session.open_unknown();
            frame.unknown = true;
            return frame;
        };

        let mut object = ParserObject::new(ptype).with_offsets(Some(offset), Some(real_offset));
        object.attributes = attributes.plain;
        object.ns_attributes = attributes.namespaced;
        let id_attribute = &self.config.xml.id_attribute;
        object.id = crate::object::ObjectView::attribute(&object, &id_attribute.name, id_attribute.namespace.as_deref())
            .map(str::to_string);

        let category = ptype.category;
        if session.open(object) {
            if category != Category::Reference {
                frame.object = Some(category);
            }
        } else {
            frame.unknown = true;
        }
        frame
    }

    fn close_element(session: &mut ParseSession<'c>, frame: &Frame, end: usize, real_end: usize) {
        if let Some(category) = frame.object {
            session.close(category, Some(end), Some(real_end));
        }
        if frame.unknown {
            session.close_unknown();
        }
        if frame.variable {
            session.close_variable();
        }
    }

    fn check_root(&self, name: &str, seen_root: &mut bool) -> Result<(), ParseError> {
        if *seen_root {
            return Ok(());
        }
        *seen_root = true;
        match &self.config.xml.root_tag {
            Some(root) if root != name => Err(ParseError::MissingRootTag {
                expected: root.clone(),
                found: name.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl DocumentLexer for XmlLexer<'_> {
    fn config(&self) -> &MappingConfig {
        self.config
    }

    fn parse_str(&self, input: &str) -> MtasResult<TokenCollection> {
        let mut reader = NsReader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut session = ParseSession::new(self.config);
        let mut chars = CharCounter::new(input);
        let mut frames: Vec<Frame> = Vec::new();
        let mut content_depth = 0usize;
        let mut seen_root = false;

        loop {
            let before = reader.buffer_position() as usize;
            let (namespace, event) = match reader.read_resolved_event() {
                Ok((resolved, event)) => (namespace_of(resolved), event),
                Err(e) => {
                    let reason = e.to_string();
                    return Err(ParseError::Xml {
                        position: before,
                        reason,
                    }
                    .into());
                }
            };
            let after = reader.buffer_position() as usize;

            match event {
                Event::Decl(decl) => {
                    if let Some(Ok(encoding)) = decl.encoding() {
                        let encoding = String::from_utf8_lossy(&encoding).into_owned();
                        let normalized = encoding.to_ascii_lowercase();
                        if normalized != "utf-8" && normalized != "utf8" {
                            return Err(ParseError::UnsupportedEncoding { encoding }.into());
                        }
                    }
                }
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    self.check_root(&name, &mut seen_root)?;
                    let attributes = Self::read_attributes(&reader, start)?;
                    let active = self.config.xml.content_tags.is_empty() || content_depth > 0;
                    let offset = OffsetRange::new(chars.at(before), chars.at(before));
                    let real = OffsetRange::new(before, before);
                    let frame = self.open_element(&mut session, name, namespace, attributes, active, offset, real);
                    if frame.content {
                        content_depth += 1;
                    }
                    if matches!(event, Event::Empty(_)) {
                        Self::close_element(&mut session, &frame, chars.at(after), after);
                        if frame.content {
                            content_depth -= 1;
                        }
                    } else {
                        frames.push(frame);
                    }
                }
                Event::End(_) => {
                    if let Some(frame) = frames.pop() {
                        Self::close_element(&mut session, &frame, chars.at(after), after);
                        if frame.content {
                            content_depth = content_depth.saturating_sub(1);
                        }
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| ParseError::Xml {
                        position: before,
                        reason: e.to_string(),
                    })?;
                    session.append_text(&text);
                }
                Event::CData(data) => {
                    session.append_text(&String::from_utf8_lossy(&data));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(frame) = frames.last() {
            return Err(ParseError::UnclosedElement {
                name: frame.name.clone(),
            }
            .into());
        }
        if let (false, Some(root)) = (seen_root, &self.config.xml.root_tag) {
            return Err(ParseError::MissingRootTag {
                expected: root.clone(),
                found: String::new(),
            }
            .into());
        }
        session.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtas_core::{DocumentFormat, MtasError, XmlFlavor};

    const WORDS: &str = r#"<parser name="xml">
        <mappings>
          <mapping type="word" name="w">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="s">
            <token><pre><item type="name"/></pre></token>
          </mapping>
        </mappings>
      </parser>"#;

    #[test]
    fn test_words_in_sentence() {
        let config = MappingConfig::from_xml_str(WORDS).unwrap();
        let tokens = XmlLexer::new(&config)
            .parse_str("<doc><s><w>Hello</w> <w>world</w></s></doc>")
            .unwrap();
        let words: Vec<_> = tokens.of_type("w").collect();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].postfix().unwrap(), "Hello");
        assert_eq!(words[1].positions.iter().copied().collect::<Vec<_>>(), vec![1]);
        let group = tokens.of_type("s").next().unwrap();
        assert_eq!(group.positions.len(), 2);
        let offset = group.offset.unwrap();
        assert!(offset.contains(&words[0].offset.unwrap()));
        assert!(offset.contains(&words[1].offset.unwrap()));
        assert_eq!(words[0].parent_id, Some(group.id));
    }

    #[test]
    fn test_real_offsets_are_bytes() {
        let config = MappingConfig::from_xml_str(WORDS).unwrap();
        let input = "<doc><w>é</w><w>b</w></doc>";
        let tokens = XmlLexer::new(&config).parse_str(input).unwrap();
        let second = tokens.of_type("w").nth(1).unwrap();
        assert_eq!(second.real_offset.unwrap().start, input.find("<w>b").unwrap());
        assert_eq!(second.offset.unwrap().start, 13);
    }

    #[test]
    fn test_non_utf8_encoding_rejected() {
        let config = MappingConfig::from_xml_str(WORDS).unwrap();
        let err = XmlLexer::new(&config)
            .parse_str(r#"<?xml version="1.0" encoding="ISO-8859-1"?><doc/>"#)
            .unwrap_err();
        assert!(matches!(err, MtasError::Parse(ParseError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_root_tag_and_malformed_input() {
        let mut config = MappingConfig::from_xml_str(WORDS).unwrap();
        config.xml.root_tag = Some("TEI".to_string());
        let lexer = XmlLexer::new(&config);
        assert!(matches!(
            lexer.parse_str("<doc/>"),
            Err(MtasError::Parse(ParseError::MissingRootTag { .. }))
        ));
        assert!(matches!(
            lexer.parse_str("<TEI><w>a</s></TEI>"),
            Err(MtasError::Parse(ParseError::Xml { .. }))
        ));
        assert!(matches!(
            lexer.parse_str("<TEI><w>a</w>"),
            Err(MtasError::Parse(_))
        ));
    }

    #[test]
    fn test_tei_namespace_and_content() {
        let mut config = MappingConfig::from_xml_str(WORDS).unwrap();
        config.format = DocumentFormat::Xml(XmlFlavor::Tei);
        config.xml = mtas_core::XmlSettings::for_flavor(XmlFlavor::Tei);
        let input = r#"<TEI xmlns="http://www.tei-c.org/ns/1.0">
            <teiHeader><w>skip</w></teiHeader>
            <text><w xml:id="w1">kept</w><x:w xmlns:x="urn:other">other</x:w></text>
          </TEI>"#;
        let tokens = XmlLexer::new(&config).parse_str(input).unwrap();
        let words: Vec<_> = tokens.of_type("w").collect();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].postfix().unwrap(), "kept");
    }
}
