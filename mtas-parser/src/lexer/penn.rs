//! Penn Treebank lexer - bracketed trees
//!
//! `(LABEL ...)` is a level mapped to a group, `(POS word)` is a leaf mapped
//! to a word plus a `pos` annotation. `(ID x)` names the outermost group and
//! `(CODE x)` tags the enclosing level.

use super::DocumentLexer;
use crate::object::ParserObject;
use crate::session::ParseSession;
use mtas_core::{
    merge_offset, Category, MappingConfig, MtasResult, OffsetRange, ParseError, Position, TokenCollection,
};
use std::collections::BTreeSet;

pub const WORD: &str = "word";
pub const POS: &str = "pos";
pub const ROOT: &str = "ROOT";
pub const CODE: &str = "CODE";
pub const ID: &str = "ID";
pub const EMPTY_CATEGORY: &str = "-NONE-";

pub struct PennLexer<'c> {
    config: &'c MappingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracket<'a> {
    Open(usize),
    Close(usize),
    Atom(&'a str, usize),
}

fn tokenize(input: &str) -> Vec<Bracket<'_>> {
    let mut out = Vec::new();
    let mut atom_start: Option<usize> = None;
    for (i, c) in input.char_indices() {
        let boundary = c == '(' || c == ')' || c.is_whitespace();
        if boundary {
            if let Some(start) = atom_start.take() {
                out.push(Bracket::Atom(&input[start..i], start));
            }
            match c {
                '(' => out.push(Bracket::Open(i)),
                ')' => out.push(Bracket::Close(i)),
                _ => {}
            }
        } else if atom_start.is_none() {
            atom_start = Some(i);
        }
    }
    if let Some(start) = atom_start {
        out.push(Bracket::Atom(&input[start..], start));
    }
    out
}

/// Undo the bracket escapes used for words.
pub fn unescape_word(word: &str) -> &str {
    match word {
        "-LRB-" => "(",
        "-RRB-" => ")",
        "-LCB-" => "{",
        "-RCB-" => "}",
        "-LSB-" => "[",
        "-RSB-" => "]",
        other => other,
    }
}

/// Split `NP-SBJ=2` into base `NP` and function `SBJ=2`.
pub fn split_label(label: &str) -> (&str, &str) {
    match label.char_indices().skip(1).find(|(_, c)| *c == '-' || *c == '=') {
        Some((i, _)) => (&label[..i], &label[i + 1..]),
        None => (label, ""),
    }
}

/// An open level while walking the tree.
#[derive(Debug, Default)]
struct Level {
    mapped: bool,
    positions: BTreeSet<Position>,
    offset: Option<OffsetRange>,
    real_offset: Option<OffsetRange>,
    codes: Vec<String>,
}

impl<'c> PennLexer<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    fn open_level(session: &mut ParseSession<'c>, label: Option<&str>) -> Level {
        let label = label.unwrap_or(ROOT);
        let (base, function) = split_label(label);
        let ptype = session
            .lookup_type_in(Category::Group, label)
            .or_else(|| session.lookup_type_in(Category::Group, base));
        let Some(ptype) = ptype else {
            session.open_unknown();
            return Level::default();
        };
        let object = ParserObject::new(ptype)
            .with_attribute("label", label)
            .with_attribute("base", base)
            .with_attribute("function", function);
        Level {
            mapped: session.open(object),
            ..Level::default()
        }
    }

    fn close_level(session: &mut ParseSession<'c>, level: Level, parent: Option<&mut Level>) {
        for code in &level.codes {
            if level.positions.is_empty() {
                tracing::debug!(%code, "code on a level without words");
                continue;
            }
            let Some(ptype) = session.lookup_type_in(Category::Group, CODE) else {
                continue;
            };
            let mut object = ParserObject::new(ptype)
                .with_attribute("value", code.as_str())
                .with_text(code.as_str())
                .with_offsets(level.offset, level.real_offset);
            object.positions = level.positions.clone();
            session.emit(object);
        }
        if level.mapped {
            session.close(Category::Group, None, None);
        } else {
            session.close_unknown();
        }
        if let Some(parent) = parent {
            parent.positions.extend(level.positions);
            if let Some(offset) = level.offset {
                parent.offset = Some(merge_offset(parent.offset, offset));
            }
            if let Some(real) = level.real_offset {
                parent.real_offset = Some(merge_offset(parent.real_offset, real));
            }
        }
    }

    fn emit_leaf(session: &mut ParseSession<'c>, pos: &str, raw: &str, offset: OffsetRange, real: OffsetRange) -> Option<Position> {
        let ptype = session.lookup_type_in(Category::Word, WORD)?;
        let word = unescape_word(raw);
        let object = ParserObject::new(ptype)
            .with_attribute("pos", pos)
            .with_offsets(Some(offset), Some(real));
        let position = session.position_count();
        if !session.open(object) {
            session.close_unknown();
            return None;
        }
        session.append_text(word);
        if let Some(ptype) = session.lookup_type_in(Category::WordAnnotation, POS) {
            session.emit(ParserObject::new(ptype).with_attribute("value", pos).with_text(pos));
        }
        session.close(Category::Word, None, None);
        Some(position)
    }
}

impl DocumentLexer for PennLexer<'_> {
    fn config(&self) -> &MappingConfig {
        self.config
    }

    fn parse_str(&self, input: &str) -> MtasResult<TokenCollection> {
        let tokens = tokenize(input);
        let mut session = ParseSession::new(self.config);
        let mut levels: Vec<Level> = Vec::new();
        let mut next_char: Option<usize> = None;
        let mut i = 0;

        while i < tokens.len() {
            match tokens[i] {
                Bracket::Open(at) => {
                    if let (Some(Bracket::Atom(label, _)), Some(Bracket::Atom(raw, raw_at)), Some(Bracket::Close(_))) =
                        (tokens.get(i + 1).copied(), tokens.get(i + 2).copied(), tokens.get(i + 3).copied())
                    {
                        i += 4;
                        match label {
                            ID => {
                                if !session.set_outermost_id(Category::Group, raw) {
                                    tracing::debug!(id = raw, "tree id without open group");
                                }
                            }
                            CODE => match levels.last_mut() {
                                Some(level) => level.codes.push(raw.to_string()),
                                None => tracing::debug!(code = raw, "code outside any level"),
                            },
                            EMPTY_CATEGORY => {}
                            pos => {
                                let word = unescape_word(raw);
                                let begin = next_char.map_or(0, |end| end + 1);
                                let end = begin + word.chars().count();
                                next_char = Some(end);
                                let offset = OffsetRange::new(begin, end);
                                let real = OffsetRange::new(raw_at, raw_at + raw.len());
                                let position = Self::emit_leaf(&mut session, pos, raw, offset, real);
                                if let (Some(position), Some(level)) = (position, levels.last_mut()) {
                                    level.positions.insert(position);
                                    level.offset = Some(merge_offset(level.offset, offset));
                                    level.real_offset = Some(merge_offset(level.real_offset, real));
                                }
                            }
                        }
                        continue;
                    }
                    let label = match tokens.get(i + 1) {
                        Some(Bracket::Atom(label, _)) => {
                            i += 2;
                            Some(*label)
                        }
                        _ => {
                            i += 1;
                            None
                        }
                    };
                    tracing::trace!(at, ?label, "open level");
                    levels.push(Self::open_level(&mut session, label));
                }
                Bracket::Close(at) => {
                    let Some(level) = levels.pop() else {
                        return Err(ParseError::BracketMismatch {
                            position: at,
                            reason: "closing bracket without open level".to_string(),
                        }
                        .into());
                    };
                    Self::close_level(&mut session, level, levels.last_mut());
                    i += 1;
                }
                Bracket::Atom(atom, at) => {
                    return Err(ParseError::BracketMismatch {
                        position: at,
                        reason: format!("unexpected atom {atom}"),
                    }
                    .into());
                }
            }
        }

        if !levels.is_empty() {
            return Err(ParseError::BracketMismatch {
                position: input.len(),
                reason: format!("{} unclosed brackets", levels.len()),
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

    const CONFIG: &str = r#"<parser name="penn">
        <mappings>
          <mapping type="word" name="word">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="wordAnnotation" name="pos">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
          <mapping type="group" name="NP">
            <token><pre><item type="string" value="np"/></pre><post><item type="attribute" name="function"/></post></token>
          </mapping>
          <mapping type="group" name="ROOT">
            <token><pre><item type="name"/></pre><post><item type="attribute" name="id"/></post></token>
          </mapping>
          <mapping type="group" name="CODE">
            <token><pre><item type="name"/></pre><post><item type="text"/></post></token>
          </mapping>
        </mappings>
      </parser>"#;

    #[test]
    fn test_split_label() {
        assert_eq!(split_label("NP-SBJ"), ("NP", "SBJ"));
        assert_eq!(split_label("NP=2"), ("NP", "2"));
        assert_eq!(split_label("-NONE-"), ("-NONE", ""));
        assert_eq!(split_label("S"), ("S", ""));
    }

    #[test]
    fn test_tree_with_id_and_code() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        let input = "( (S (NP-SBJ (DT The) (NN cat) (CODE c1)) (VP (VBD sat) (-NONE- *T*)) (. .)) (ID s1))";
        let tokens = PennLexer::new(&config).parse_str(input).unwrap();

        let words: Vec<_> = tokens.of_type(WORD).filter_map(|t| t.postfix()).collect();
        assert_eq!(words, vec!["The", "cat", "sat", "."]);
        let np = tokens.of_type("NP").next().unwrap();
        assert_eq!(np.postfix().unwrap(), "SBJ");
        assert_eq!(np.positions.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
        let code = tokens.of_type(CODE).next().unwrap();
        assert_eq!(code.postfix().unwrap(), "c1");
        assert_eq!(code.positions, np.positions);
        assert_eq!(code.parent_id, Some(np.id));
        let root = tokens.of_type(ROOT).next().unwrap();
        assert_eq!(root.postfix().unwrap(), "s1");
        assert_eq!(root.positions.len(), 4);
    }

    #[test]
    fn test_escaped_words() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        let tokens = PennLexer::new(&config)
            .parse_str("((-LRB- -LRB-) (NN x) (-RRB- -RRB-))")
            .unwrap();
        let words: Vec<_> = tokens.of_type(WORD).filter_map(|t| t.postfix()).collect();
        assert_eq!(words, vec!["(", "x", ")"]);
        assert_eq!(tokens.of_type(WORD).nth(1).unwrap().offset, Some(OffsetRange::new(2, 3)));
    }

    #[test]
    fn test_bracket_mismatch() {
        let config = MappingConfig::from_xml_str(CONFIG).unwrap();
        let lexer = PennLexer::new(&config);
        for input in ["((NN x)", "(NN x))", "(S stray (NN x))"] {
            assert!(matches!(
                lexer.parse_str(input),
                Err(MtasError::Parse(ParseError::BracketMismatch { .. }))
            ));
        }
    }
}
