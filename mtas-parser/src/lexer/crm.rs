//! CRM lexer - one annotated word per line
//!
//! Columns: key, word, lemma, code, sentence marker, clause marker, pair
//! markers (`b`/`e`) and pair ids. `-` means "no value".

use super::DocumentLexer;
use crate::object::ParserObject;
use crate::session::ParseSession;
use mtas_core::{Category, MappingConfig, MtasResult, OffsetRange, ParseError, Position, TokenCollection};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*$")
        .expect("Invalid CRM row regex")
});

pub const SENTENCE: &str = "crmSentence";
pub const CLAUSE: &str = "crmClause";
pub const PAIR: &str = "crmPair";
pub const WORD: &str = "word";

const NONE: &str = "-";

pub struct CrmLexer<'c> {
    config: &'c MappingConfig,
}

/// A pair waiting for its end marker.
#[derive(Debug, Default)]
struct OpenPair {
    markers: Vec<String>,
    positions: BTreeSet<Position>,
    offset: Option<OffsetRange>,
    real_offset: Option<OffsetRange>,
}

impl OpenPair {
    fn add(&mut self, marker: String, position: Position, offset: OffsetRange, real: OffsetRange) {
        self.markers.push(marker);
        self.positions.insert(position);
        self.offset = Some(mtas_core::merge_offset(self.offset, offset));
        self.real_offset = Some(mtas_core::merge_offset(self.real_offset, real));
    }
}

struct Row<'a> {
    columns: [&'a str; 8],
    /// Byte offset of the word form inside the input.
    word_start: usize,
}

impl<'c> CrmLexer<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self { config }
    }

    fn parse_row<'a>(line: &'a str, line_start: usize, number: usize) -> Result<Option<Row<'a>>, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.split_whitespace().all(|c| c.starts_with('@')) {
            return Ok(None);
        }
        let caps = ROW.captures(line).ok_or_else(|| ParseError::UnparsableLine {
            line: number,
            content: trimmed.to_string(),
        })?;
        let mut columns = [""; 8];
        for (i, column) in columns.iter_mut().enumerate() {
            *column = caps.get(i + 1).map_or("", |m| m.as_str());
        }
        let word_start = line_start + caps.get(2).map_or(0, |m| m.start());
        Ok(Some(Row { columns, word_start }))
    }

    fn open_group(&self, session: &mut ParseSession<'c>, name: &str) -> bool {
        let Some(ptype) = session.lookup_type_in(Category::Group, name) else {
            return false;
        };
        if session.open(ParserObject::new(ptype)) {
            return true;
        }
        session.close_unknown();
        false
    }

    fn close_group(session: &mut ParseSession<'c>, open: &mut bool) {
        if *open {
            session.close(Category::Group, None, None);
            *open = false;
        }
    }

    fn emit_word(
        &self,
        session: &mut ParseSession<'c>,
        row: &Row<'_>,
        offset: OffsetRange,
        real: OffsetRange,
    ) -> Option<Position> {
        let [key, word, lemma, code, ..] = row.columns;
        let ptype = session.lookup_type_in(Category::Word, WORD)?;
        let object = ParserObject::new(ptype)
            .with_id(key)
            .with_attribute("key", key)
            .with_attribute("word", word)
            .with_attribute("lemma", lemma)
            .with_attribute("code", code)
            .with_offsets(Some(offset), Some(real));
        let position = session.position_count();
        if !session.open(object) {
            session.close_unknown();
            return None;
        }
        session.append_text(word);

        for (i, value) in row.columns.iter().enumerate() {
            if *value == NONE {
                continue;
            }
            if let Some(ptype) = session.lookup_type_in(Category::WordAnnotation, &i.to_string()) {
                session.emit(ParserObject::new(ptype).with_attribute("value", *value).with_text(*value));
            }
        }
        for function in &self.config.functions {
            let Some(value) = row.columns.get(function.column) else {
                continue;
            };
            let Some(output) = function.apply(value) else {
                continue;
            };
            if let Some(ptype) = session.lookup_type_in(Category::WordAnnotation, &function.name) {
                session.emit(ParserObject::new(ptype).with_attribute("value", output.as_str()).with_text(output));
            }
        }
        session.close(Category::Word, None, None);
        Some(position)
    }

    fn emit_pair(session: &mut ParseSession<'c>, id: &str, pair: OpenPair) {
        let Some(ptype) = session.lookup_type_in(Category::Relation, PAIR) else {
            return;
        };
        let mut object = ParserObject::new(ptype)
            .with_attribute("name", id)
            .with_text(pair.markers.join("+"))
            .with_offsets(pair.offset, pair.real_offset);
        object.positions = pair.positions;
        session.emit(object);
    }
}

impl DocumentLexer for CrmLexer<'_> {
    fn config(&self) -> &MappingConfig {
        self.config
    }

    fn parse_str(&self, input: &str) -> MtasResult<TokenCollection> {
        let mut session = ParseSession::new(self.config);
        let mut sentence_open = false;
        let mut clause_open = false;
        let mut pairs: BTreeMap<String, OpenPair> = BTreeMap::new();
        let mut next_char = 0usize;
        let mut line_start = 0usize;

        for (index, raw) in input.split_inclusive('\n').enumerate() {
            let start = line_start;
            line_start += raw.len();
            let Some(row) = Self::parse_row(raw, start, index + 1)? else {
                continue;
            };

            if row.columns[4] == "+" {
                Self::close_group(&mut session, &mut clause_open);
                Self::close_group(&mut session, &mut sentence_open);
                sentence_open = self.open_group(&mut session, SENTENCE);
            }
            if row.columns[5] == "+" {
                Self::close_group(&mut session, &mut clause_open);
                clause_open = self.open_group(&mut session, CLAUSE);
            }

            let word = row.columns[1];
            let length = word.chars().count();
            let offset = OffsetRange::new(next_char, next_char + length);
            let real = OffsetRange::new(row.word_start, row.word_start + word.len());
            next_char += length + 1;

            let Some(position) = self.emit_word(&mut session, &row, offset, real) else {
                continue;
            };

            let markers = row.columns[6].split(',');
            let ids = row.columns[7].split(',');
            for (marker, id) in markers.zip(ids) {
                if marker == NONE || id == NONE {
                    continue;
                }
                match marker {
                    "b" => pairs
                        .entry(id.to_string())
                        .or_default()
                        .add(format!("b{id}"), position, offset, real),
                    "e" => {
                        let mut pair = pairs.remove(id).unwrap_or_default();
                        pair.add(format!("e{id}"), position, offset, real);
                        Self::emit_pair(&mut session, id, pair);
                    }
                    other => tracing::debug!(marker = other, line = index + 1, "unknown pair marker"),
                }
            }
        }

        Self::close_group(&mut session, &mut clause_open);
        Self::close_group(&mut session, &mut sentence_open);
        for (id, pair) in std::mem::take(&mut pairs) {
            tracing::debug!(%id, "pair without end marker");
            Self::emit_pair(&mut session, &id, pair);
        }
        session.finish()
    }
}
