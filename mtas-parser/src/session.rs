//! Per-document parse state
//!
//! Lexers drive a [`ParseSession`] with open/close/text events; the session
//! owns the stacks, the token arena and the ledger, and hands closed objects
//! to the mapping compiler.

use crate::evaluator::{compute_items, literal_text, precheck};
use crate::ledger::{Ledger, LedgerReport};
use crate::object::{ObjectStacks, ObjectView, ParserObject, PendingLocal, VariableElement};
use mtas_core::{
    Category, MappingConfig, MtasResult, OffsetRange, ParseError, ParserType, Position, TokenCollection,
    TokenId, VariableDeclaration,
};

/// Mutable state of one document parse.
pub struct ParseSession<'c> {
    pub(crate) config: &'c MappingConfig,
    pub(crate) stacks: ObjectStacks<'c>,
    pub(crate) tokens: TokenCollection,
    pub(crate) ledger: Ledger,
    /// Open elements that are unmapped or failed precheck.
    pub(crate) unknown_depth: usize,
    /// Local references with no enclosing group left to wait in.
    pub(crate) orphan_locals: Vec<PendingLocal>,
    next_position: Position,
    variable_elements: Vec<(&'c VariableDeclaration, VariableElement)>,
}

impl<'c> ParseSession<'c> {
    pub fn new(config: &'c MappingConfig) -> Self {
        Self {
            config,
            stacks: ObjectStacks::new(),
            tokens: TokenCollection::new(),
            ledger: Ledger::new(),
            unknown_depth: 0,
            orphan_locals: Vec::new(),
            next_position: 0,
            variable_elements: Vec::new(),
        }
    }

    pub fn config(&self) -> &'c MappingConfig {
        self.config
    }

    pub fn tokens(&self) -> &TokenCollection {
        &self.tokens
    }

    /// Number of positions handed out so far.
    pub fn position_count(&self) -> Position {
        self.next_position
    }

    pub fn depth(&self, category: Category) -> usize {
        self.stacks.depth(category)
    }

    // ========================================================================
    // TYPE LOOKUP
    // ========================================================================

    fn is_legal(&self, category: Category) -> bool {
        let in_word = self.stacks.depth(Category::Word) > 0;
        match category {
            Category::Word => !in_word,
            Category::WordAnnotation => in_word,
            Category::Group | Category::Relation => !in_word,
            Category::GroupAnnotation => !in_word && self.stacks.depth(Category::Group) > 0,
            Category::RelationAnnotation => !in_word && self.stacks.depth(Category::Relation) > 0,
            Category::Reference => true,
        }
    }

    /// First type named `name` that may open here, trying categories in order.
    pub fn lookup_type(&self, name: &str) -> Option<&'c ParserType> {
        Category::ALL
            .into_iter()
            .find_map(|category| self.lookup_type_in(category, name))
    }

    /// Type of one category, if configured and legal here.
    pub fn lookup_type_in(&self, category: Category, name: &str) -> Option<&'c ParserType> {
        let ptype = self.config.types.get(category, name)?;
        self.is_legal(category).then_some(ptype)
    }

    pub fn variable_declaration(&self, name: &str) -> Option<&'c VariableDeclaration> {
        self.config.variable(name)
    }

    // ========================================================================
    // STRUCTURE EVENTS
    // ========================================================================

    /// Open an object. Returns `false` when precheck rejects it, in which
    /// case it counts as an unknown ancestor and must be closed with
    /// [`close_unknown`](Self::close_unknown).
    pub fn open(&mut self, mut object: ParserObject<'c>) -> bool {
        let category = object.category();
        if category == Category::Reference {
            self.add_reference(&object);
            return true;
        }
        object.unknown_ancestors = self.unknown_depth;
        let Some(prechecked) = precheck(&object, &self.stacks) else {
            tracing::trace!(name = %object.ptype.name, %category, "precheck rejected object");
            self.unknown_depth += 1;
            return false;
        };
        object.prechecked = prechecked;
        tracing::trace!(name = %object.ptype.name, %category, "open");
        self.stacks.push(object);
        if category == Category::Word {
            let position = self.next_position;
            self.next_position += 1;
            for open in self.stacks.iter_mut() {
                open.positions.insert(position);
            }
        }
        true
    }

    /// Open an element that has no usable type.
    pub fn open_unknown(&mut self) {
        self.unknown_depth += 1;
    }

    pub fn close_unknown(&mut self) {
        self.unknown_depth = self.unknown_depth.saturating_sub(1);
    }

    /// Record a cross-reference on the innermost open object.
    fn add_reference(&mut self, reference: &ParserObject<'c>) {
        let Some(attribute) = reference.ptype.reference_attribute.as_deref() else {
            return;
        };
        let Some(value) = reference.attributes.get(attribute) else {
            return;
        };
        let id = value.strip_prefix('#').unwrap_or(value).to_string();
        match self.stacks.innermost_any_mut() {
            Some(target) => target.reference_ids.push(id),
            None => tracing::debug!(%id, "reference outside any object"),
        }
    }

    /// Close the innermost object of a category and compile it.
    ///
    /// `offset_end` and `real_end` extend the offsets started at open.
    pub fn close(
        &mut self,
        category: Category,
        offset_end: Option<usize>,
        real_end: Option<usize>,
    ) -> Vec<TokenId> {
        let Some(mut object) = self.stacks.pop(category) else {
            tracing::debug!(%category, "close without open object");
            return Vec::new();
        };
        if let Some(end) = offset_end {
            let start = object.offset.map_or(end, |o| o.start);
            object.extend_offset(OffsetRange::new(start, end));
        }
        if let Some(end) = real_end {
            let start = object.real_offset.map_or(end, |o| o.start);
            object.extend_real_offset(OffsetRange::new(start, end));
        }
        if category == Category::Word {
            for open in self.stacks.iter_mut() {
                if let Some(offset) = object.offset {
                    open.extend_offset(offset);
                }
                if let Some(real) = object.real_offset {
                    open.extend_real_offset(real);
                }
            }
        }
        if let Some(annotated) = category.annotated() {
            if let Some(target) = self.stacks.innermost(annotated) {
                object.positions.extend(target.positions.iter().copied());
                if object.offset.is_none() {
                    object.offset = target.offset;
                }
                if object.real_offset.is_none() {
                    object.real_offset = target.real_offset;
                }
            }
        }
        tracing::trace!(name = %object.ptype.name, %category, "close");
        self.compile(object)
    }

    /// Open and immediately close a fully described object.
    pub fn emit(&mut self, object: ParserObject<'c>) -> Vec<TokenId> {
        let category = object.category();
        if category == Category::Reference {
            self.open(object);
            return Vec::new();
        }
        if self.open(object) {
            self.close(category, None, None)
        } else {
            self.close_unknown();
            Vec::new()
        }
    }

    /// Append text to every open object collecting text and every open
    /// variable element.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for open in self.stacks.iter_mut() {
            if open.collects_text() {
                open.text.push_str(text);
            }
        }
        for (_, element) in self.variable_elements.iter_mut() {
            element.text.push_str(text);
        }
    }

    /// Set the id of the outermost open object of a category.
    pub fn set_outermost_id(&mut self, category: Category, id: &str) -> bool {
        match self.stacks.outermost_mut(category) {
            Some(object) => {
                object.id = Some(id.to_string());
                object.attributes.insert("id".to_string(), id.to_string());
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // VARIABLES
    // ========================================================================

    pub fn open_variable(&mut self, declaration: &'c VariableDeclaration, element: VariableElement) {
        self.variable_elements.push((declaration, element));
    }

    /// Close the innermost variable element and store its value.
    pub fn close_variable(&mut self) {
        let Some((declaration, element)) = self.variable_elements.pop() else {
            return;
        };
        let Some(id) = element.attribute(&declaration.id_attribute, None) else {
            tracing::debug!(variable = %declaration.name, "variable element without id");
            return;
        };
        let id = id.to_string();
        let value = compute_items(&element, &declaration.values, &self.stacks, &self.ledger.variables)
            .first()
            .and_then(literal_text);
        match value {
            Some(value) => self.ledger.variables.insert(&declaration.name, &id, value),
            None => tracing::debug!(variable = %declaration.name, %id, "variable without value"),
        }
    }

    // ========================================================================
    // END OF DOCUMENT
    // ========================================================================

    /// Resolve everything still deferred without running the consistency pass.
    pub fn resolve(&mut self) -> LedgerReport {
        for pending in self.orphan_locals.drain(..) {
            tracing::debug!(start = %pending.start, end = %pending.end, "dropping unresolved local reference");
        }
        self.ledger.resolve(&mut self.tokens, self.config.reference_depth)
    }

    /// Resolve deferred values, run the consistency pass and hand out the tokens.
    pub fn finish(mut self) -> MtasResult<TokenCollection> {
        if let Some(name) = self.stacks.innermost_name() {
            return Err(ParseError::UnclosedElement {
                name: name.to_string(),
            }
            .into());
        }
        let report = self.resolve();
        if report != LedgerReport::default() {
            tracing::debug!(?report, "deferred resolution incomplete");
        }
        let check = self
            .tokens
            .check(self.config.autorepair, self.config.makeunique)?;
        tracing::debug!(tokens = self.tokens.len(), ?check, "document finished");
        Ok(self.tokens)
    }
}
