//! Output tokens

use crate::enums::Category;
use crate::filter::{apply_filters, Filter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Token identifier, equal to the token's index while a document is parsed.
pub type TokenId = u32;

/// Word position inside a document.
pub type Position = u32;

/// Separates the prefix and postfix halves of a token value.
pub const TOKEN_DELIMITER: char = '\u{1}';

/// Half-open character or byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: usize,
    pub end: usize,
}

impl OffsetRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Smallest range covering both.
    pub fn union(self, other: OffsetRange) -> OffsetRange {
        OffsetRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, other: &OffsetRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Extend an optional range with another one.
pub fn merge_offset(current: Option<OffsetRange>, extra: OffsetRange) -> OffsetRange {
    match current {
        Some(range) => range.union(extra),
        None => extra,
    }
}

/// Token payload: one `f32`, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Payload(pub [u8; 4]);

impl Payload {
    pub fn from_f32(value: f32) -> Self {
        Payload(value.to_be_bytes())
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_be_bytes(self.0)
    }

    /// Keep the larger of two payloads.
    pub fn max(self, other: Payload) -> Payload {
        if other.as_f32() > self.as_f32() {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// A piece of a token value that may still wait for a variable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuePart {
    Literal(String),
    PendingVariable {
        name: String,
        id: String,
        filters: Vec<Filter>,
        prefix: Option<String>,
    },
}

impl ValuePart {
    pub fn is_pending(&self) -> bool {
        matches!(self, ValuePart::PendingVariable { .. })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ValuePart::Literal(text) => text.replace(TOKEN_DELIMITER, "").is_empty(),
            ValuePart::PendingVariable { .. } => false,
        }
    }
}

/// A variable lookup that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedVariable {
    pub name: String,
    pub id: String,
}

impl fmt::Display for UnresolvedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable {}[{}]", self.name, self.id)
    }
}

/// Prefix and postfix halves of a token value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenValue {
    pub prefix: Vec<ValuePart>,
    pub postfix: Vec<ValuePart>,
}

impl TokenValue {
    pub fn literal(prefix: impl Into<String>, postfix: impl Into<String>) -> Self {
        Self {
            prefix: vec![ValuePart::Literal(prefix.into())],
            postfix: vec![ValuePart::Literal(postfix.into())],
        }
    }

    pub fn is_pending(&self) -> bool {
        self.prefix.iter().chain(self.postfix.iter()).any(ValuePart::is_pending)
    }

    /// Full value `prefix DELIM postfix`, or `None` while a variable is pending.
    pub fn render(&self) -> Option<String> {
        let prefix = render_parts(&self.prefix)?;
        let postfix = render_parts(&self.postfix)?;
        Some(format!("{}{}{}", prefix, TOKEN_DELIMITER, postfix))
    }

    pub fn prefix_str(&self) -> Option<String> {
        render_parts(&self.prefix)
    }

    pub fn postfix_str(&self) -> Option<String> {
        render_parts(&self.postfix)
    }

    /// Replace pending parts using `lookup(name, id)`.
    ///
    /// Parts that cannot be resolved stay pending and are reported.
    pub fn resolve_with<F>(&mut self, lookup: F) -> Vec<UnresolvedVariable>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let mut failures = Vec::new();
        for part in self.prefix.iter_mut().chain(self.postfix.iter_mut()) {
            if let ValuePart::PendingVariable {
                name,
                id,
                filters,
                prefix,
            } = part
            {
                match lookup(name, id) {
                    Some(value) => {
                        *part = ValuePart::Literal(apply_filters(&value, filters, prefix.as_deref()))
                    }
                    None => failures.push(UnresolvedVariable {
                        name: name.clone(),
                        id: id.clone(),
                    }),
                }
            }
        }
        failures
    }
}

fn render_parts(parts: &[ValuePart]) -> Option<String> {
    let mut out = String::new();
    for part in parts {
        match part {
            ValuePart::Literal(text) => out.push_str(text),
            ValuePart::PendingVariable { .. } => return None,
        }
    }
    Some(out)
}

// ============================================================================
// TOKEN
// ============================================================================

/// A search token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub category: Category,
    pub type_name: String,
    pub value: TokenValue,
    pub positions: BTreeSet<Position>,
    pub offset: Option<OffsetRange>,
    pub real_offset: Option<OffsetRange>,
    pub parent_id: Option<TokenId>,
    pub payload: Option<Payload>,
}

impl Token {
    pub fn new(id: TokenId, category: Category, type_name: impl Into<String>, value: TokenValue) -> Self {
        Self {
            id,
            category,
            type_name: type_name.into(),
            value,
            positions: BTreeSet::new(),
            offset: None,
            real_offset: None,
            parent_id: None,
            payload: None,
        }
    }

    pub fn min_position(&self) -> Option<Position> {
        self.positions.first().copied()
    }

    pub fn max_position(&self) -> Option<Position> {
        self.positions.last().copied()
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn add_positions<I: IntoIterator<Item = Position>>(&mut self, positions: I) {
        self.positions.extend(positions);
    }

    pub fn extend_offset(&mut self, range: OffsetRange) {
        self.offset = Some(merge_offset(self.offset, range));
    }

    pub fn prefix(&self) -> Option<String> {
        self.value.prefix_str()
    }

    pub fn postfix(&self) -> Option<String> {
        self.value.postfix_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip_and_max() {
        let a = Payload::from_f32(0.25);
        let b = Payload::from_f32(1.5);
        assert_eq!(a.0, 0.25f32.to_be_bytes());
        assert_eq!(a.max(b).as_f32(), 1.5);
        assert_eq!(b.max(a).as_f32(), 1.5);
    }

    #[test]
    fn test_render_literal_value() {
        let value = TokenValue::literal("w", "Hello");
        assert_eq!(value.render().unwrap(), "w\u{1}Hello");
        assert!(!value.is_pending());
    }

    #[test]
    fn test_pending_value_resolution() {
        let mut value = TokenValue {
            prefix: vec![ValuePart::Literal("entity".to_string())],
            postfix: vec![
                ValuePart::Literal("x:".to_string()),
                ValuePart::PendingVariable {
                    name: "person".to_string(),
                    id: "p1".to_string(),
                    filters: vec![Filter::Uppercase],
                    prefix: None,
                },
            ],
        };
        assert!(value.render().is_none());
        let failures = value.resolve_with(|name, id| {
            (name == "person" && id == "p1").then(|| "Anna".to_string())
        });
        assert!(failures.is_empty());
        assert_eq!(value.postfix_str().unwrap(), "x:ANNA");
    }

    #[test]
    fn test_unknown_variable_is_reported() {
        let mut value = TokenValue {
            prefix: vec![ValuePart::PendingVariable {
                name: "person".to_string(),
                id: "p9".to_string(),
                filters: Vec::new(),
                prefix: None,
            }],
            postfix: Vec::new(),
        };
        let failures = value.resolve_with(|_, _| None);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].to_string(), "variable person[p9]");
        assert!(value.is_pending());
    }

    #[test]
    fn test_offset_union_and_contains() {
        let a = OffsetRange::new(5, 10);
        let b = OffsetRange::new(2, 7);
        let u = a.union(b);
        assert_eq!(u, OffsetRange::new(2, 10));
        assert!(u.contains(&a));
        assert!(!a.contains(&b));
        assert_eq!(OffsetRange::new(9, 3), OffsetRange::new(3, 9));
    }
}
