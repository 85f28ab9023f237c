//! Sketch (vertical) lexer - one word per line, structure as tag lines

use super::DocumentLexer;
use crate::object::ParserObject;
use crate::session::ParseSession;
use mtas_core::{Category, MappingConfig, MtasResult, OffsetRange, ParseError, TokenCollection};
use once_cell::sync::Lazy;
use regex::Regex;

static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<([A-Za-z_][\w.:-]*)((?:\s+[\w.:-]+\s*=\s*"[^"]*")*)\s*(/?)>$"#)
        .expect("Invalid open tag regex")
});
static CLOSE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</([A-Za-z_][\w.:-]*)\s*>$").expect("Invalid close tag regex"));
static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w.:-]+)\s*=\s*"([^"]*)""#).expect("Invalid attribute regex"));

pub const WORD: &str = "word";
pub const GLUE: &str = "g";

pub struct SketchLexer<'c> {
    config: &'c MappingConfig,
}

/// A structure tag still waiting for its closing line.
struct OpenTag {
    name: String,
    mapped: bool,
}

impl<'c> SketchLexer<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    fn open_tag(session: &mut ParseSession<'c>, name: &str, attributes: &str) -> bool {
        let Some(ptype) = session.lookup_type_in(Category::Group, name) else {
            session.open_unknown();
            return false;
        };
        let mut object = ParserObject::new(ptype);
        for caps in ATTRIBUTE.captures_iter(attributes) {
            object.attributes.insert(caps[1].to_string(), caps[2].to_string());
        }
        object.id = object.attributes.get("id").cloned();
        // A rejected object already counts as unknown.
        session.open(object)
    }

    fn close_tag(session: &mut ParseSession<'c>, tag: &OpenTag) {
        if tag.mapped {
            session.close(Category::Group, None, None);
        } else {
            session.close_unknown();
        }
    }

    fn emit_word(session: &mut ParseSession<'c>, columns: &[&str], offset: OffsetRange, real: OffsetRange) {
        let Some(ptype) = session.lookup_type_in(Category::Word, WORD) else {
            return;
        };
        let mut object = ParserObject::new(ptype).with_offsets(Some(offset), Some(real));
        for (i, value) in columns.iter().enumerate() {
            object.attributes.insert(i.to_string(), value.to_string());
        }
        if !session.open(object) {
            session.close_unknown();
            return;
        }
        session.append_text(columns[0]);
        for (i, value) in columns.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            if let Some(ptype) = session.lookup_type_in(Category::WordAnnotation, &i.to_string()) {
                session.emit(ParserObject::new(ptype).with_attribute("value", *value).with_text(*value));
            }
        }
        session.close(Category::Word, None, None);
    }
}

impl DocumentLexer for SketchLexer<'_> {
    fn config(&self) -> &MappingConfig {
        self.config
    }

    fn parse_str(&self, input: &str) -> MtasResult<TokenCollection> {
        let mut session = ParseSession::new(self.config);
        let mut open: Vec<OpenTag> = Vec::new();
        let mut next_char: Option<usize> = None;
        let mut glue = false;
        let mut line_start = 0usize;

        for (index, raw) in input.split_inclusive('\n').enumerate() {
            let start = line_start;
            line_start += raw.len();
            let number = index + 1;
            let line = raw.trim_end_matches(['\n', '\r']);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('<') && trimmed.ends_with('>') && !trimmed.contains('\t') {
                if let Some(caps) = CLOSE_TAG.captures(trimmed) {
                    let name = &caps[1];
                    match open.pop() {
                        Some(tag) if tag.name == name => Self::close_tag(&mut session, &tag),
                        _ => {
                            return Err(ParseError::UnexpectedClose {
                                name: name.to_string(),
                                line: number,
                            }
                            .into())
                        }
                    }
                } else if let Some(caps) = OPEN_TAG.captures(trimmed) {
                    let name = caps[1].to_string();
                    let self_closing = !caps[3].is_empty();
                    if name == GLUE && self_closing {
                        glue = true;
                        continue;
                    }
                    let mapped = Self::open_tag(&mut session, &name, &caps[2]);
                    let tag = OpenTag { name, mapped };
                    if self_closing {
                        Self::close_tag(&mut session, &tag);
                    } else {
                        open.push(tag);
                    }
                } else {
                    return Err(ParseError::UnparsableLine {
                        line: number,
                        content: trimmed.to_string(),
                    }
                    .into());
                }
                continue;
            }

            let columns: Vec<&str> = line.split('\t').collect();
            let form = columns[0];
            let begin = match next_char {
                None => 0,
                Some(end) if glue => end,
                Some(end) => end + 1,
            };
            let end = begin + form.chars().count();
            next_char = Some(end);
            glue = false;
            let real = OffsetRange::new(start, start + form.len());
            Self::emit_word(&mut session, &columns, OffsetRange::new(begin, end), real);
        }

        if let Some(tag) = open.last() {
            return Err(ParseError::UnclosedElement {
                name: tag.name.clone(),
            }
            .into());
        }
        session.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtas_core::MtasError;

    const CONFIG: &str = r#"<parser name="sketch">
        <mappings>
          <mapping type="word" name="word">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="1">
            <token><pre><item type="string" value="pos"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="s">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="n"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    #[test]
    fn test_vertical_document() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        let input = "<doc id=\"d1\">\n<s n=\"1\">\nHello\tUH\n<g/>\n!\tPUNCT\n</s>\n</doc>\n";
        let tokens = SketchLexer::new(&config).parse_str(input).unwrap();
        let words: Vec<_> = tokens.of_type(WORD).collect();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].offset, Some(OffsetRange::new(5, 6)));
        assert_eq!(words[0].real_offset.unwrap().start, input.find("Hello").unwrap());
        let pos: Vec<_> = tokens.of_type("1").filter_map(|t| t.postfix()).collect();
        assert_eq!(pos, vec!["UH", "PUNCT"]);
        let sentence = tokens.of_type("s").next().unwrap();
        assert_eq!(sentence.postfix().unwrap(), "1");
        assert_eq!(sentence.positions.len(), 2);
    }

    #[test]
    fn test_structural_errors() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        let lexer = SketchLexer::new(&config);
        assert!(matches!(
            lexer.parse_str("<s>\nword\n</p>\n"),
            Err(MtasError::Parse(ParseError::UnexpectedClose { line: 3, .. }))
        ));
        assert!(matches!(
            lexer.parse_str("<s>\nword\n"),
            Err(MtasError::Parse(ParseError::UnclosedElement { .. }))
        ));
        assert!(matches!(
            lexer.parse_str("<s broken=>\n"),
            Err(MtasError::Parse(ParseError::UnparsableLine { line: 1, .. }))
        ));
    }
}
