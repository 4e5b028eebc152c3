//! Test utilities: in-memory implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::compose::{Combinator, ComposeOptions, compose};
use crate::error::AppError;
use crate::models::{NewPattern, PageId, Pattern, RuleId};
use crate::traits::{Document, DomNode, PatternStore};

// ---------------------------------------------------------------------------
// MockPatternStore
// ---------------------------------------------------------------------------

/// A call received by [`MockPatternStore`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create(NewPattern),
    UpdateSelector(RuleId, String),
    ListForPage(PageId),
    ListChildren(RuleId),
    Delete(RuleId),
}

/// Rule store backed by an in-memory Vec of flat rule records.
#[derive(Clone)]
pub struct MockPatternStore {
    rules: Arc<Mutex<Vec<Pattern>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    next_id: Arc<Mutex<RuleId>>,
    create_error: Arc<Mutex<Option<AppError>>>,
    update_error: Arc<Mutex<Option<AppError>>>,
}

impl MockPatternStore {
    /// Store with no rules.
    pub fn empty() -> Self {
        Self::with_rules(Vec::new())
    }

    /// Store seeded with flat rule records. New ids continue after the
    /// highest seeded id.
    pub fn with_rules(rules: Vec<Pattern>) -> Self {
        let next_id = rules.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        Self {
            rules: Arc::new(Mutex::new(rules)),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(next_id)),
            create_error: Arc::new(Mutex::new(None)),
            update_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The next `create` call fails with `error`.
    pub fn fail_create_with(self, error: AppError) -> Self {
        *self.create_error.lock().unwrap() = Some(error);
        self
    }

    /// The next `update_selector` call fails with `error`.
    pub fn fail_update_with(self, error: AppError) -> Self {
        *self.update_error.lock().unwrap() = Some(error);
        self
    }

    pub fn rule(&self, id: RuleId) -> Option<Pattern> {
        self.rules.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn top_level(&self, page: PageId) -> Vec<Pattern> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.parent_pattern.is_none() && r.source_page == Some(page))
            .cloned()
            .collect()
    }

    pub fn children(&self, parent: RuleId) -> Vec<Pattern> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.parent_pattern == Some(parent))
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn missing(id: RuleId) -> AppError {
        AppError::StoreError {
            status_code: 404,
            message: format!("rule {id} not found"),
        }
    }
}

impl PatternStore for MockPatternStore {
    async fn create(&self, rule: &NewPattern) -> Result<Pattern, AppError> {
        self.record(StoreCall::Create(rule.clone()));
        if let Some(e) = self.create_error.lock().unwrap().take() {
            return Err(e);
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let pattern = rule.clone().into_pattern(id);
        self.rules.lock().unwrap().push(pattern.clone());
        Ok(pattern)
    }

    async fn update_selector(&self, id: RuleId, selector: &str) -> Result<(), AppError> {
        self.record(StoreCall::UpdateSelector(id, selector.to_string()));
        if let Some(e) = self.update_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Self::missing(id))?;
        rule.selector = selector.to_string();
        Ok(())
    }

    async fn list_for_page(&self, page: PageId) -> Result<Vec<Pattern>, AppError> {
        self.record(StoreCall::ListForPage(page));
        Ok(self.top_level(page))
    }

    async fn list_children(&self, parent: RuleId) -> Result<Vec<Pattern>, AppError> {
        self.record(StoreCall::ListChildren(parent));
        Ok(self.children(parent))
    }

    async fn delete(&self, id: RuleId) -> Result<(), AppError> {
        self.record(StoreCall::Delete(id));
        let mut rules = self.rules.lock().unwrap();
        let pos = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Self::missing(id))?;
        rules.remove(pos);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockDocument
// ---------------------------------------------------------------------------

struct MockElement {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// An element arena standing in for a rendered document.
///
/// `select` understands selectors registered with [`MockDocument::register`]
/// plus any exact path [`compose`] would produce for one of its elements
/// (either combinator, with or without id anchoring).
pub struct MockDocument {
    elements: Vec<MockElement>,
    registered: HashMap<String, Vec<usize>>,
}

impl MockDocument {
    /// A document whose root element (index 0) has tag `root`.
    pub fn new(root: &str) -> Self {
        Self {
            elements: vec![MockElement {
                tag: root.to_string(),
                attrs: Vec::new(),
                parent: None,
                children: Vec::new(),
            }],
            registered: HashMap::new(),
        }
    }

    /// Append a child element under `parent`; returns its index.
    pub fn append(&mut self, parent: usize, tag: &str, attrs: &[(&str, &str)]) -> usize {
        let index = self.elements.len();
        self.elements.push(MockElement {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.elements[parent].children.push(index);
        index
    }

    /// Make `selector` resolve to `indices`.
    pub fn register(&mut self, selector: &str, indices: &[usize]) {
        self.registered
            .insert(selector.to_string(), indices.to_vec());
    }

    pub fn node(&self, index: usize) -> MockNode<'_> {
        MockNode { doc: self, index }
    }
}

impl Document for MockDocument {
    type Node<'a> = MockNode<'a>;

    fn select<'a>(&'a self, selector: &str) -> Result<Vec<MockNode<'a>>, AppError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(AppError::InvalidSelector(selector.to_string()));
        }
        if let Some(indices) = self.registered.get(selector) {
            return Ok(indices.iter().map(|&i| self.node(i)).collect());
        }

        let variants = [
            ComposeOptions::default(),
            ComposeOptions::default().with_combinator(Combinator::Descendant),
            ComposeOptions::default().prefer_id(),
        ];
        Ok((0..self.elements.len())
            .map(|i| self.node(i))
            .filter(|node| variants.iter().any(|o| compose(node, *o) == selector))
            .collect())
    }
}

/// Handle to one element of a [`MockDocument`].
#[derive(Clone, Copy)]
pub struct MockNode<'a> {
    doc: &'a MockDocument,
    index: usize,
}

impl MockNode<'_> {
    fn element(&self) -> &MockElement {
        &self.doc.elements[self.index]
    }
}

impl PartialEq for MockNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.index == other.index
    }
}

impl fmt::Debug for MockNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}#{}>", self.element().tag, self.index)
    }
}

impl DomNode for MockNode<'_> {
    fn tag_name(&self) -> String {
        self.element().tag.to_ascii_lowercase()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.element()
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn parent_element(&self) -> Option<Self> {
        self.element().parent.map(|index| MockNode {
            doc: self.doc,
            index,
        })
    }

    fn element_siblings(&self) -> Vec<Self> {
        match self.element().parent {
            Some(parent) => self.doc.elements[parent]
                .children
                .iter()
                .map(|&index| MockNode {
                    doc: self.doc,
                    index,
                })
                .collect(),
            None => vec![*self],
        }
    }
}
