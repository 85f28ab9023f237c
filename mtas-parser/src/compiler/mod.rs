//! Mapping compiler - closed parser objects to tokens
//!
//! # Pipeline
//!
//! ```text
//! closed ParserObject
//!     ↓  per MappingRule: postcheck → local reference lookup
//!     ↓  per MappingToken: pre × post values, payload, policies, parent
//! Tokens in the arena + deferrals (ancestors, ledger, local references)
//!     ↓
//! pending children / positions / offsets of the object resolved or forwarded
//! ```

use crate::evaluator::{compute_items, is_empty_alternative, literal_text, postcheck, push_part, Alternative};
use crate::object::{LocalAnchor, ObjectView, ParserObject, PendingLocal};
use crate::session::ParseSession;
use mtas_core::{
    Category, MappingRule, MappingToken, OffsetRange, Payload, SourcePolicy, Token, TokenId, TokenValue,
    ValuePart, TOKEN_DELIMITER,
};

/// Strip the `#` of an in-document pointer.
fn local_key(value: &str) -> String {
    value.strip_prefix('#').unwrap_or(value).to_string()
}

fn span_keys(object: &ParserObject<'_>, rule: &MappingRule) -> Option<(String, String)> {
    let span = rule.local_reference.as_ref()?;
    let start = object.attribute(&span.start, None)?;
    let end = object.attribute(&span.end, None)?;
    Some((local_key(start), local_key(end)))
}

/// Positions and offset covered by a start and an end anchor.
fn anchored_span(start: LocalAnchor, end: LocalAnchor) -> (std::ops::RangeInclusive<u32>, Option<OffsetRange>) {
    let first = start.position.min(end.position);
    let last = start.position.max(end.position);
    let offset = match (start.offset, end.offset) {
        (Some(a), Some(b)) => Some(OffsetRange::new(a, b)),
        _ => None,
    };
    (first..=last, offset)
}

impl<'c> ParseSession<'c> {
    /// Run every rule of a closed object's type and settle its deferrals.
    pub(crate) fn compile(&mut self, mut object: ParserObject<'c>) -> Vec<TokenId> {
        let ptype = object.ptype;
        let mut produced = Vec::new();

        for (index, rule) in ptype.rules.iter().enumerate() {
            if !postcheck(&object, index, rule, &self.stacks) {
                tracing::debug!(name = %ptype.name, category = %ptype.category, "mapping rejected by conditions");
                continue;
            }

            let keys = span_keys(&object, rule);
            let mut parked = None;
            if let Some((start, end)) = &keys {
                if object.positions.is_empty() {
                    match self.lookup_local(start, end) {
                        Some((positions, offset)) => {
                            object.positions.extend(positions);
                            if offset.is_some() {
                                object.offset = offset;
                            }
                        }
                        None => parked = Some((start.clone(), end.clone())),
                    }
                }
            }

            let mut rule_tokens = Vec::new();
            for mtoken in &rule.tokens {
                let ids = self.create_tokens(&object, rule, mtoken);
                if parked.is_some() {
                    rule_tokens.extend(ids.iter().map(|id| (*id, mtoken.offset)));
                }
                produced.extend(ids);
            }

            if let Some((start, end)) = parked {
                if !rule_tokens.is_empty() {
                    self.park_local(PendingLocal {
                        start,
                        end,
                        tokens: rule_tokens,
                    });
                }
            } else if let Some((start, end)) = keys {
                self.produce_local(&object, start, end);
            }
        }

        self.settle(object, &produced);
        produced
    }

    // ========================================================================
    // TOKEN CREATION
    // ========================================================================

    fn create_tokens(&mut self, object: &ParserObject<'c>, rule: &MappingRule, mtoken: &MappingToken) -> Vec<TokenId> {
        let variables = &self.ledger.variables;
        let pre = compute_items(object, &mtoken.pre, &self.stacks, variables);
        if pre.is_empty() || pre.iter().any(is_empty_alternative) {
            tracing::debug!(name = %object.name(), "token rejected: empty pre value");
            return Vec::new();
        }
        let post = compute_items(object, &mtoken.post, &self.stacks, variables);

        let values: Vec<TokenValue> = if post.is_empty() {
            pre.into_iter()
                .map(|prefix| TokenValue {
                    prefix: strip_delimiter(prefix),
                    postfix: Vec::new(),
                })
                .collect()
        } else {
            pre.iter()
                .flat_map(|prefix| {
                    post.iter().map(move |postfix| TokenValue {
                        prefix: strip_delimiter(prefix.clone()),
                        postfix: strip_delimiter(postfix.clone()),
                    })
                })
                .collect()
        };

        let payload = compute_items(object, &mtoken.payload, &self.stacks, variables)
            .iter()
            .filter_map(literal_text)
            .filter_map(|text| text.trim().parse::<f32>().ok())
            .map(Payload::from_f32)
            .reduce(Payload::max);

        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            let id = self.tokens.next_id();
            let pending = value.is_pending();
            let mut token = Token::new(id, rule.category, ptype_name(object), value);
            token.payload = payload;

            match rule.position {
                SourcePolicy::OwnObject => token.add_positions(object.positions.iter().copied()),
                SourcePolicy::ByReference => self.ledger.defer_positions(id, object.reference_ids.clone()),
                policy => self.defer_on_ancestor(policy, id, true),
            }
            if mtoken.offset {
                match rule.offset {
                    SourcePolicy::OwnObject => token.offset = object.offset,
                    SourcePolicy::ByReference => self.ledger.defer_offset(id, object.reference_ids.clone()),
                    policy => self.defer_on_ancestor(policy, id, false),
                }
            }
            if mtoken.real_offset {
                token.real_offset = object.real_offset;
            }
            if mtoken.parent {
                match self.stacks.parent_target(rule.category) {
                    Some(parent) => parent.pending_parent.push(id),
                    None => tracing::trace!(id, "token without parent"),
                }
            }

            self.tokens.push(token);
            if pending {
                self.ledger.defer_variables(id);
            }
            ids.push(id);
        }
        ids
    }

    fn defer_on_ancestor(&mut self, policy: SourcePolicy, id: TokenId, positions: bool) {
        let Some(category) = policy.ancestor_category() else {
            return;
        };
        match self.stacks.innermost_mut(category) {
            Some(ancestor) if positions => ancestor.pending_position.push(id),
            Some(ancestor) => ancestor.pending_offset.push(id),
            None => tracing::debug!(id, %category, "no open ancestor for source policy"),
        }
    }

    // ========================================================================
    // LOCAL REFERENCES
    // ========================================================================

    /// Find a start/end key pair in the enclosing groups, innermost first.
    fn lookup_local(&self, start: &str, end: &str) -> Option<(std::ops::RangeInclusive<u32>, Option<OffsetRange>)> {
        self.stacks
            .ancestors(Category::Group, None)
            .into_iter()
            .find_map(|group| {
                let s = group.local_starts.get(start)?;
                let e = group.local_ends.get(end)?;
                Some(anchored_span(*s, *e))
            })
    }

    fn produce_local(&mut self, object: &ParserObject<'c>, start: String, end: String) {
        let (Some(first), Some(last)) = (object.positions.first(), object.positions.last()) else {
            return;
        };
        let start_anchor = LocalAnchor {
            position: *first,
            offset: object.offset.map(|o| o.start),
        };
        let end_anchor = LocalAnchor {
            position: *last,
            offset: object.offset.map(|o| o.end),
        };
        match self.stacks.innermost_mut(Category::Group) {
            Some(group) => {
                group.local_starts.insert(start, start_anchor);
                group.local_ends.insert(end, end_anchor);
            }
            None => tracing::debug!(%start, %end, "local reference outside any group"),
        }
    }

    fn park_local(&mut self, pending: PendingLocal) {
        match self.stacks.innermost_mut(Category::Group) {
            Some(group) => group.pending_local.push(pending),
            None => self.orphan_locals.push(pending),
        }
    }

    /// Patch waiting local references a closing group can answer, then hand
    /// its maps and the rest to the enclosing group.
    fn settle_group_locals(&mut self, object: &mut ParserObject<'c>) {
        let pending = std::mem::take(&mut object.pending_local);
        let mut unresolved = Vec::new();
        for entry in pending {
            let anchors = (object.local_starts.get(&entry.start), object.local_ends.get(&entry.end));
            let (Some(start), Some(end)) = anchors else {
                unresolved.push(entry);
                continue;
            };
            let (positions, offset) = anchored_span(*start, *end);
            for (id, wants_offset) in &entry.tokens {
                if let Some(token) = self.tokens.get_mut(*id) {
                    token.add_positions(positions.clone());
                    if let (true, Some(offset)) = (*wants_offset, offset) {
                        token.offset = Some(offset);
                    }
                }
            }
        }

        let starts = std::mem::take(&mut object.local_starts);
        let ends = std::mem::take(&mut object.local_ends);
        match self.stacks.innermost_mut(Category::Group) {
            Some(outer) => {
                outer.local_starts.extend(starts);
                outer.local_ends.extend(ends);
                outer.pending_local.extend(unresolved);
            }
            None => self.orphan_locals.extend(unresolved),
        }
    }

    // ========================================================================
    // SETTLING
    // ========================================================================

    /// Resolve or forward what waits on a closed object, then record its id.
    fn settle(&mut self, mut object: ParserObject<'c>, produced: &[TokenId]) {
        let category = object.category();

        let children = std::mem::take(&mut object.pending_parent);
        match produced.first() {
            Some(first) => {
                for child in children {
                    if let Some(token) = self.tokens.get_mut(child) {
                        token.parent_id = Some(*first);
                    }
                }
            }
            None if !children.is_empty() => match self.stacks.parent_target(category) {
                Some(parent) => parent.pending_parent.extend(children),
                None => tracing::trace!(count = children.len(), "children left without parent"),
            },
            None => {}
        }

        let waiting_positions = std::mem::take(&mut object.pending_position);
        if object.positions.is_empty() {
            if let Some(outer) = self.stacks.innermost_mut(category) {
                outer.pending_position.extend(waiting_positions);
            }
        } else {
            for id in waiting_positions {
                if let Some(token) = self.tokens.get_mut(id) {
                    token.add_positions(object.positions.iter().copied());
                }
            }
        }

        let waiting_offsets = std::mem::take(&mut object.pending_offset);
        match object.offset {
            Some(offset) => {
                for id in waiting_offsets {
                    if let Some(token) = self.tokens.get_mut(id) {
                        token.extend_offset(offset);
                    }
                }
            }
            None => {
                if let Some(outer) = self.stacks.innermost_mut(category) {
                    outer.pending_offset.extend(waiting_offsets);
                }
            }
        }

        if category == Category::Group {
            self.settle_group_locals(&mut object);
        }

        if let Some(id) = object.id.as_deref() {
            if !object.positions.is_empty() {
                self.ledger.record_positions(id, &object.positions);
                if let Some(offset) = object.offset {
                    self.ledger.record_offset(id, offset);
                }
            } else if !object.reference_ids.is_empty() {
                self.ledger.record_chain(id, &object.reference_ids);
            }
        }
    }
}

fn ptype_name(object: &ParserObject<'_>) -> String {
    object.ptype.name.clone()
}

/// Drop delimiter characters from literal parts so the halves stay separable.
fn strip_delimiter(alternative: Alternative) -> Vec<ValuePart> {
    let mut out = Vec::with_capacity(alternative.len());
    for part in alternative {
        match part {
            ValuePart::Literal(text) if text.contains(TOKEN_DELIMITER) => {
                push_part(&mut out, ValuePart::Literal(text.replace(TOKEN_DELIMITER, "")))
            }
            other => push_part(&mut out, other),
        }
    }
    out
}
