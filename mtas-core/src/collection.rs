//! Token collection and the end-of-document consistency pass

use crate::error::ConsistencyError;
use crate::token::{OffsetRange, Position, Token, TokenId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Ordered token store. Ids are handed out sequentially and never reused.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenCollection {
    tokens: Vec<Token>,
    next_id: TokenId,
}

/// What the consistency pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub removed_without_positions: usize,
    pub removed_unresolved: usize,
    pub merged_duplicates: usize,
    pub cleared_parents: usize,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        *self == CheckReport::default()
    }
}

type UniqueKey = (Option<String>, Vec<Position>, Option<OffsetRange>);

impl TokenCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next pushed token must carry.
    pub fn next_id(&self) -> TokenId {
        self.next_id
    }

    pub fn push(&mut self, token: Token) -> TokenId {
        let id = token.id;
        debug_assert!(id >= self.next_id, "token ids must increase");
        self.next_id = id + 1;
        self.tokens.push(token);
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.index_of(id).map(|i| &self.tokens[i])
    }

    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.index_of(id).map(move |i| &mut self.tokens[i])
    }

    fn index_of(&self, id: TokenId) -> Option<usize> {
        // Ids equal indices until the consistency pass removes tokens.
        if let Some(token) = self.tokens.get(id as usize) {
            if token.id == id {
                return Some(id as usize);
            }
        }
        self.tokens.binary_search_by_key(&id, |t| t.id).ok()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Token> {
        self.tokens.iter_mut()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Tokens of one type, in id order.
    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Token> + 'a {
        self.tokens.iter().filter(move |t| t.type_name == type_name)
    }

    /// Validate the collection, optionally repairing and deduplicating it.
    ///
    /// Without `autorepair` the first problem is returned as an error.
    pub fn check(
        &mut self,
        autorepair: bool,
        makeunique: bool,
    ) -> Result<CheckReport, ConsistencyError> {
        let mut report = CheckReport::default();

        let mut kept = Vec::with_capacity(self.tokens.len());
        for token in self.tokens.drain(..) {
            if !token.has_positions() {
                if !autorepair {
                    return Err(ConsistencyError::NoPositions { id: token.id });
                }
                tracing::warn!(id = token.id, "removing token without positions");
                report.removed_without_positions += 1;
                continue;
            }
            if token.value.is_pending() {
                if !autorepair {
                    return Err(ConsistencyError::UnresolvedValue { id: token.id });
                }
                tracing::warn!(id = token.id, "removing token with unresolved value");
                report.removed_unresolved += 1;
                continue;
            }
            kept.push(token);
        }
        self.tokens = kept;

        let mut replaced: HashMap<TokenId, TokenId> = HashMap::new();
        if makeunique {
            let mut seen: HashMap<UniqueKey, TokenId> = HashMap::new();
            let mut unique = Vec::with_capacity(self.tokens.len());
            for token in self.tokens.drain(..) {
                let key = (
                    token.value.render(),
                    token.positions.iter().copied().collect(),
                    token.offset,
                );
                match seen.get(&key) {
                    Some(survivor) => {
                        replaced.insert(token.id, *survivor);
                        report.merged_duplicates += 1;
                    }
                    None => {
                        seen.insert(key, token.id);
                        unique.push(token);
                    }
                }
            }
            self.tokens = unique;
        }

        let present: HashSet<TokenId> = self.tokens.iter().map(|t| t.id).collect();
        for token in self.tokens.iter_mut() {
            let Some(parent) = token.parent_id else {
                continue;
            };
            let parent = replaced.get(&parent).copied().unwrap_or(parent);
            if parent == token.id || !present.contains(&parent) {
                if !autorepair {
                    return Err(ConsistencyError::DanglingParent {
                        id: token.id,
                        parent,
                    });
                }
                token.parent_id = None;
                report.cleared_parents += 1;
            } else {
                token.parent_id = Some(parent);
            }
        }

        let parents: HashMap<TokenId, TokenId> = self
            .tokens
            .iter()
            .filter_map(|t| t.parent_id.map(|p| (t.id, p)))
            .collect();
        let mut cyclic = Vec::new();
        for &start in parents.keys() {
            let mut visited = HashSet::from([start]);
            let mut current = start;
            while let Some(&parent) = parents.get(&current) {
                if !visited.insert(parent) {
                    cyclic.push(start);
                    break;
                }
                current = parent;
            }
        }
        cyclic.sort_unstable();
        for id in cyclic {
            if !autorepair {
                return Err(ConsistencyError::ParentCycle { id });
            }
            if let Some(token) = self.get_mut(id) {
                if token.parent_id.take().is_some() {
                    report.cleared_parents += 1;
                }
            }
        }

        if !report.is_clean() {
            tracing::debug!(?report, "consistency pass repaired token collection");
        }
        Ok(report)
    }
}
