//! Deferred resolution of by-id references and variables
//!
//! Everything here is resolved once the whole document has been seen.
//! Ancestor and local-reference deferrals live on the parser objects.

use mtas_core::{OffsetRange, Position, TokenCollection, TokenId, UnresolvedVariable};
use std::collections::{BTreeSet, HashMap};

/// Variable values by variable name, then id.
#[derive(Debug, Clone, Default)]
pub struct VariableTables {
    tables: HashMap<String, HashMap<String, String>>,
}

impl VariableTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: &str, value: String) {
        self.tables
            .entry(name.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn lookup(&self, name: &str, id: &str) -> Option<&str> {
        self.tables.get(name)?.get(id).map(String::as_str)
    }
}

/// What end-of-document resolution achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerReport {
    pub unresolved_positions: usize,
    pub unresolved_offsets: usize,
    pub unresolved_variables: Vec<UnresolvedVariable>,
}

/// Id tables plus the tokens waiting on them.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    id_positions: HashMap<String, BTreeSet<Position>>,
    id_offsets: HashMap<String, OffsetRange>,
    /// Ids without positions that point at other ids.
    chains: HashMap<String, Vec<String>>,
    position_refs: Vec<(TokenId, Vec<String>)>,
    offset_refs: Vec<(TokenId, Vec<String>)>,
    variable_tokens: Vec<TokenId>,
    pub variables: VariableTables,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_positions(&mut self, id: &str, positions: &BTreeSet<Position>) {
        self.id_positions
            .entry(id.to_string())
            .or_default()
            .extend(positions.iter().copied());
    }

    pub fn record_offset(&mut self, id: &str, offset: OffsetRange) {
        let merged = match self.id_offsets.get(id) {
            Some(existing) => existing.union(offset),
            None => offset,
        };
        self.id_offsets.insert(id.to_string(), merged);
    }

    pub fn record_chain(&mut self, id: &str, targets: &[String]) {
        self.chains
            .entry(id.to_string())
            .or_default()
            .extend(targets.iter().cloned());
    }

    pub fn defer_positions(&mut self, token: TokenId, ids: Vec<String>) {
        self.position_refs.push((token, ids));
    }

    pub fn defer_offset(&mut self, token: TokenId, ids: Vec<String>) {
        self.offset_refs.push((token, ids));
    }

    pub fn defer_variables(&mut self, token: TokenId) {
        self.variable_tokens.push(token);
    }

    /// Positions behind an id, following chains for at most `depth` hops.
    pub fn positions_for(&self, id: &str, depth: usize) -> Option<BTreeSet<Position>> {
        if let Some(positions) = self.id_positions.get(id) {
            return Some(positions.clone());
        }
        if depth == 0 {
            return None;
        }
        let mut found = BTreeSet::new();
        for target in self.chains.get(id)? {
            if let Some(positions) = self.positions_for(target, depth - 1) {
                found.extend(positions);
            }
        }
        (!found.is_empty()).then_some(found)
    }

    /// Offset behind an id, following chains for at most `depth` hops.
    pub fn offset_for(&self, id: &str, depth: usize) -> Option<OffsetRange> {
        if let Some(offset) = self.id_offsets.get(id) {
            return Some(*offset);
        }
        if depth == 0 {
            return None;
        }
        self.chains
            .get(id)?
            .iter()
            .filter_map(|target| self.offset_for(target, depth - 1))
            .reduce(OffsetRange::union)
    }

    /// Patch every deferred token. Running it again changes nothing.
    pub fn resolve(&self, tokens: &mut TokenCollection, depth: usize) -> LedgerReport {
        let mut report = LedgerReport::default();

        for (token_id, ids) in &self.position_refs {
            let positions: BTreeSet<Position> = ids
                .iter()
                .filter_map(|id| self.positions_for(id, depth))
                .flatten()
                .collect();
            if positions.is_empty() {
                tracing::debug!(token = token_id, ?ids, "reference positions not found");
                report.unresolved_positions += 1;
                continue;
            }
            if let Some(token) = tokens.get_mut(*token_id) {
                token.add_positions(positions);
            }
        }

        for (token_id, ids) in &self.offset_refs {
            let offset = ids
                .iter()
                .filter_map(|id| self.offset_for(id, depth))
                .reduce(OffsetRange::union);
            match (offset, tokens.get_mut(*token_id)) {
                (Some(offset), Some(token)) => token.extend_offset(offset),
                (None, _) => {
                    tracing::debug!(token = token_id, ?ids, "reference offset not found");
                    report.unresolved_offsets += 1;
                }
                _ => {}
            }
        }

        for token_id in &self.variable_tokens {
            let Some(token) = tokens.get_mut(*token_id) else {
                continue;
            };
            let failures = token.value.resolve_with(|name, id| {
                self.variables.lookup(name, id).map(str::to_string)
            });
            for failure in failures {
                tracing::warn!(token = token_id, %failure, "variable lookup failed");
                report.unresolved_variables.push(failure);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtas_core::{Category, Token, TokenValue, ValuePart};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_chain_resolution_respects_depth() {
        let mut ledger = Ledger::new();
        ledger.record_positions("w1", &BTreeSet::from([3]));
        ledger.record_chain("a", &ids(&["b"]));
        ledger.record_chain("b", &ids(&["w1"]));
        assert_eq!(ledger.positions_for("a", 2), Some(BTreeSet::from([3])));
        assert_eq!(ledger.positions_for("a", 1), None);
    }

    #[test]
    fn test_cyclic_chain_is_not_found() {
        let mut ledger = Ledger::new();
        ledger.record_chain("a", &ids(&["b"]));
        ledger.record_chain("b", &ids(&["a"]));
        assert_eq!(ledger.positions_for("a", 10), None);
        assert_eq!(ledger.offset_for("a", 10), None);
    }

    #[test]
    fn test_resolve_patches_and_is_idempotent() {
        let mut tokens = TokenCollection::new();
        tokens.push(Token::new(0, Category::Relation, "link", TokenValue::literal("link", "")));
        let mut ledger = Ledger::new();
        ledger.record_positions("w1", &BTreeSet::from([1]));
        ledger.record_positions("w2", &BTreeSet::from([4]));
        ledger.record_offset("w1", OffsetRange::new(5, 9));
        ledger.defer_positions(0, ids(&["w1", "w2", "missing"]));
        ledger.defer_offset(0, ids(&["w1"]));

        let report = ledger.resolve(&mut tokens, 10);
        assert_eq!(report, LedgerReport::default());
        let first = tokens.clone();
        ledger.resolve(&mut tokens, 10);
        assert_eq!(tokens, first);
        let token = tokens.get(0).unwrap();
        assert_eq!(token.positions, BTreeSet::from([1, 4]));
        assert_eq!(token.offset, Some(OffsetRange::new(5, 9)));
    }

    #[test]
    fn test_unresolved_offset_is_reported_not_fatal() {
        let mut tokens = TokenCollection::new();
        tokens.push(Token::new(0, Category::Group, "s", TokenValue::literal("s", "")));
        let mut ledger = Ledger::new();
        ledger.defer_offset(0, ids(&["nowhere"]));
        let report = ledger.resolve(&mut tokens, 10);
        assert_eq!(report.unresolved_offsets, 1);
        assert_eq!(tokens.get(0).unwrap().offset, None);
    }

    #[test]
    fn test_variable_resolution() {
        let mut tokens = TokenCollection::new();
        let mut token = Token::new(0, Category::Word, "w", TokenValue::literal("w", ""));
        token.value.postfix = vec![ValuePart::PendingVariable {
            name: "person".to_string(),
            id: "p1".to_string(),
            filters: Vec::new(),
            prefix: None,
        }];
        tokens.push(token);
        let mut ledger = Ledger::new();
        ledger.defer_variables(0);
        ledger.variables.insert("person", "p1", "Anna".to_string());
        let report = ledger.resolve(&mut tokens, 10);
        assert!(report.unresolved_variables.is_empty());
        assert_eq!(tokens.get(0).unwrap().postfix().unwrap(), "Anna");
    }
}
