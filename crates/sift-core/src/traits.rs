use std::future::Future;

use crate::error::AppError;
use crate::models::{ExtractionReport, NewPattern, Page, PageId, Pattern, RuleId, Site};

/// An element node of a rendered document.
///
/// Only element nodes are exposed; the document node above the root element
/// is represented by `parent_element` returning `None`.
pub trait DomNode: Clone + PartialEq {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn parent_element(&self) -> Option<Self>;

    /// Element children of this node's parent, in document order, including
    /// this node. A root element with no element parent is its own only
    /// sibling.
    fn element_siblings(&self) -> Vec<Self>;
}

/// A loaded document that selectors can be applied to.
pub trait Document {
    type Node<'a>: DomNode
    where
        Self: 'a;

    /// All elements matching `selector`, in document order.
    fn select<'a>(&'a self, selector: &str) -> Result<Vec<Self::Node<'a>>, AppError>;
}

/// Loads the HTML of a page through the sandbox proxy.
pub trait PageLoader: Send + Sync + Clone {
    fn load(
        &self,
        site: &Site,
        page: &Page,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// The external rule repository.
pub trait PatternStore: Send + Sync + Clone {
    /// Create a rule. Returns the stored record with its assigned id.
    fn create(&self, rule: &NewPattern) -> impl Future<Output = Result<Pattern, AppError>> + Send;

    /// Rewrite the selector of an existing rule.
    fn update_selector(
        &self,
        id: RuleId,
        selector: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Top-level rules of a page, in store order.
    fn list_for_page(
        &self,
        page: PageId,
    ) -> impl Future<Output = Result<Vec<Pattern>, AppError>> + Send;

    /// Direct children of a rule, in store order.
    fn list_children(
        &self,
        parent: RuleId,
    ) -> impl Future<Output = Result<Vec<Pattern>, AppError>> + Send;

    /// Delete a single rule record.
    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Triggers the server-side extraction executor for a rule.
pub trait ExtractionTrigger: Send + Sync + Clone {
    fn extract(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<ExtractionReport, AppError>> + Send;
}
