//! Live highlighting in both directions: a hovered tree row lights up the
//! elements its effective selector matches, and a hovered element becomes
//! the candidate for the next rule.

use crate::compose::{Candidate, describe};
use crate::error::AppError;
use crate::models::RuleId;
use crate::session::CrawlerSession;
use crate::traits::Document;
use crate::tree::PatternTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    /// Matches of a rule row.
    Row,
    /// A hovered element outside any hyperlink.
    Element,
    /// A hovered element inside a hyperlink; binds to `href`, not text.
    Link,
}

/// The active highlight. Matches are re-resolved from `selector` on demand,
/// since the session never mutates its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub selector: String,
    pub kind: HighlightKind,
    pub match_count: usize,
}

impl<D: Document> CrawlerSession<D> {
    /// Row → document: highlight everything the row's effective selector
    /// matches. Returns the number of matches.
    pub fn hover_row(&mut self, tree: &PatternTree, id: RuleId) -> Result<usize, AppError> {
        let selector = tree.effective_selector(id).ok_or(AppError::NotFound(id))?;
        if selector.is_empty() {
            return Err(AppError::InvalidSelector(selector));
        }
        let match_count = self.document.select(&selector)?.len();
        tracing::debug!(rule_id = %id, %selector, match_count, "Row highlighted");

        self.highlight = Some(Highlight {
            selector,
            kind: HighlightKind::Row,
            match_count,
        });
        Ok(match_count)
    }

    /// Pointer left the row or element: drop the highlight.
    pub fn hover_exit(&mut self) {
        self.highlight = None;
    }

    /// Document → row: make `candidate` the target of the next click and
    /// highlight it.
    pub fn hover_candidate(&mut self, candidate: Candidate) -> Result<&Candidate, AppError> {
        let match_count = self.document.select(&candidate.selector)?.len();
        let kind = if candidate.is_link() {
            HighlightKind::Link
        } else {
            HighlightKind::Element
        };
        self.highlight = Some(Highlight {
            selector: candidate.selector.clone(),
            kind,
            match_count,
        });
        let candidate: &Candidate = self.candidate.insert(candidate);
        Ok(candidate)
    }

    /// Hover the first element matching `locator`, if any.
    pub fn hover_first(&mut self, locator: &str) -> Result<Option<&Candidate>, AppError> {
        let candidate = self
            .document
            .select(locator)?
            .first()
            .map(|node| describe(node, self.options));

        match candidate {
            Some(candidate) => self.hover_candidate(candidate).map(Some),
            None => {
                tracing::debug!(%locator, "Nothing to hover");
                Ok(None)
            }
        }
    }

    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    /// Elements currently highlighted, in document order.
    pub fn highlighted(&self) -> Result<Vec<D::Node<'_>>, AppError> {
        match &self.highlight {
            Some(highlight) => self.document.select(&highlight.selector),
            None => Ok(Vec::new()),
        }
    }

    pub fn is_highlighted<'a>(&'a self, node: &D::Node<'a>) -> bool {
        self.highlighted()
            .map(|nodes| nodes.contains(node))
            .unwrap_or(false)
    }
}
