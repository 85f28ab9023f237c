//! Parser objects and the per-category stacks of open objects

use mtas_core::{merge_offset, Category, OffsetRange, ParserType, Position, TokenId};
use std::collections::{BTreeSet, HashMap};

/// Read access shared by parser objects and variable elements.
pub trait ObjectView {
    fn name(&self) -> &str;

    /// Attribute in the given namespace, or the default namespace for `None`.
    fn attribute(&self, name: &str, namespace: Option<&str>) -> Option<&str>;

    fn text(&self) -> &str;
}

/// Position and offset edge recorded for a local reference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAnchor {
    pub position: Position,
    pub offset: Option<usize>,
}

/// Tokens waiting for a local `start`/`end` key pair to appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLocal {
    pub start: String,
    pub end: String,
    /// Token id and whether it wants the offset as well.
    pub tokens: Vec<(TokenId, bool)>,
}

// ============================================================================
// PARSER OBJECT
// ============================================================================

/// One open structural element.
#[derive(Debug, Clone)]
pub struct ParserObject<'c> {
    pub ptype: &'c ParserType,
    pub id: Option<String>,
    pub attributes: HashMap<String, String>,
    pub ns_attributes: HashMap<String, HashMap<String, String>>,
    pub text: String,
    pub positions: BTreeSet<Position>,
    pub offset: Option<OffsetRange>,
    pub real_offset: Option<OffsetRange>,
    pub unknown_ancestors: usize,
    /// Precheck outcome per rule, taken at open.
    pub prechecked: Vec<bool>,
    pub reference_ids: Vec<String>,

    pub pending_parent: Vec<TokenId>,
    pub pending_position: Vec<TokenId>,
    pub pending_offset: Vec<TokenId>,

    // Groups only
    pub local_starts: HashMap<String, LocalAnchor>,
    pub local_ends: HashMap<String, LocalAnchor>,
    pub pending_local: Vec<PendingLocal>,
}

impl<'c> ParserObject<'c> {
    pub fn new(ptype: &'c ParserType) -> Self {
        Self {
            ptype,
            id: None,
            attributes: HashMap::new(),
            ns_attributes: HashMap::new(),
            text: String::new(),
            positions: BTreeSet::new(),
            offset: None,
            real_offset: None,
            unknown_ancestors: 0,
            prechecked: Vec::new(),
            reference_ids: Vec::new(),
            pending_parent: Vec::new(),
            pending_position: Vec::new(),
            pending_offset: Vec::new(),
            local_starts: HashMap::new(),
            local_ends: HashMap::new(),
            pending_local: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.ptype.category
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_offsets(mut self, offset: Option<OffsetRange>, real_offset: Option<OffsetRange>) -> Self {
        self.offset = offset;
        self.real_offset = real_offset;
        self
    }

    pub fn set_ns_attribute(&mut self, namespace: &str, name: impl Into<String>, value: impl Into<String>) {
        self.ns_attributes
            .entry(namespace.to_string())
            .or_default()
            .insert(name.into(), value.into());
    }

    pub fn collects_text(&self) -> bool {
        self.ptype.collect_text
    }

    pub fn extend_offset(&mut self, range: OffsetRange) {
        self.offset = Some(merge_offset(self.offset, range));
    }

    pub fn extend_real_offset(&mut self, range: OffsetRange) {
        self.real_offset = Some(merge_offset(self.real_offset, range));
    }
}

impl ObjectView for ParserObject<'_> {
    fn name(&self) -> &str {
        &self.ptype.name
    }

    fn attribute(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        match namespace {
            None => self.attributes.get(name),
            Some(ns) => self.ns_attributes.get(ns).and_then(|attrs| attrs.get(name)),
        }
        .map(String::as_str)
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// An element that only feeds a variable table.
#[derive(Debug, Clone, Default)]
pub struct VariableElement {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub ns_attributes: HashMap<String, HashMap<String, String>>,
    pub text: String,
}

impl ObjectView for VariableElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, name: &str, namespace: Option<&str>) -> Option<&str> {
        match namespace {
            None => self.attributes.get(name),
            Some(ns) => self.ns_attributes.get(ns).and_then(|attrs| attrs.get(name)),
        }
        .map(String::as_str)
    }

    fn text(&self) -> &str {
        &self.text
    }
}

// ============================================================================
// STACKS
// ============================================================================

/// Open objects, one stack per structural category, plus the global open order.
#[derive(Debug, Default)]
pub struct ObjectStacks<'c> {
    stacks: [Vec<ParserObject<'c>>; 6],
    order: Vec<Category>,
}

impl<'c> ObjectStacks<'c> {
    pub fn new() -> Self {
        Self {
            stacks: Default::default(),
            order: Vec::new(),
        }
    }

    fn slot(category: Category) -> Option<usize> {
        category.stack_index()
    }

    pub fn stack(&self, category: Category) -> &[ParserObject<'c>] {
        match Self::slot(category) {
            Some(i) => &self.stacks[i],
            None => &[],
        }
    }

    pub fn depth(&self, category: Category) -> usize {
        self.stack(category).len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Push an object; references have no stack and are ignored.
    pub fn push(&mut self, object: ParserObject<'c>) {
        let category = object.category();
        if let Some(i) = Self::slot(category) {
            self.stacks[i].push(object);
            self.order.push(category);
        }
    }

    /// Pop the innermost object of a category.
    pub fn pop(&mut self, category: Category) -> Option<ParserObject<'c>> {
        let object = self.stacks[Self::slot(category)?].pop()?;
        if let Some(at) = self.order.iter().rposition(|c| *c == category) {
            self.order.remove(at);
        }
        Some(object)
    }

    pub fn innermost(&self, category: Category) -> Option<&ParserObject<'c>> {
        self.stack(category).last()
    }

    pub fn innermost_mut(&mut self, category: Category) -> Option<&mut ParserObject<'c>> {
        self.stacks[Self::slot(category)?].last_mut()
    }

    pub fn outermost_mut(&mut self, category: Category) -> Option<&mut ParserObject<'c>> {
        self.stacks[Self::slot(category)?].first_mut()
    }

    /// Most recently opened object of any category.
    pub fn innermost_any_mut(&mut self) -> Option<&mut ParserObject<'c>> {
        let category = *self.order.last()?;
        self.innermost_mut(category)
    }

    /// Open ancestors of a category, most recent first.
    ///
    /// `None` selects all of them, `Some(n)` only the n-th most recent.
    pub fn ancestors(&self, category: Category, distance: Option<usize>) -> Vec<&ParserObject<'c>> {
        let stack = self.stack(category);
        match distance {
            None => stack.iter().rev().collect(),
            Some(n) => stack.iter().rev().nth(n).into_iter().collect(),
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ParserObject<'c>> {
        self.stacks.iter_mut().flat_map(|s| s.iter_mut())
    }

    /// Innermost object along the parent chain of `category`: same category,
    /// then the annotated category, then Group, then Relation.
    pub fn parent_target(&mut self, category: Category) -> Option<&mut ParserObject<'c>> {
        let chain = [
            Some(category),
            category.annotated(),
            Some(Category::Group),
            Some(Category::Relation),
        ];
        let target = chain
            .into_iter()
            .flatten()
            .find(|c| self.depth(*c) > 0)?;
        self.innermost_mut(target)
    }

    /// Name of the innermost open object, for error reporting.
    pub fn innermost_name(&self) -> Option<&str> {
        let category = *self.order.last()?;
        self.innermost(category).map(|o| o.ptype.name.as_str())
    }
}
