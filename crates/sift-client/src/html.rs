use scraper::{ElementRef, Html, Selector};
use sift_core::error::AppError;
use sift_core::traits::{Document, DomNode};

/// A page parsed with `scraper`, queried with CSS selectors.
///
/// The parse is lenient: malformed markup is repaired the way browsers do,
/// so `html`, `head` and `body` always exist.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    pub fn root(&self) -> HtmlNode<'_> {
        HtmlNode(self.html.root_element())
    }

    /// Parse errors recorded while repairing the markup.
    pub fn parse_errors(&self) -> usize {
        self.html.errors.len()
    }
}

impl Document for HtmlDocument {
    type Node<'a> = HtmlNode<'a>;

    fn select<'a>(&'a self, selector: &str) -> Result<Vec<HtmlNode<'a>>, AppError> {
        let parsed = Selector::parse(selector).map_err(|e| {
            tracing::debug!(%selector, error = %e, "Selector rejected");
            AppError::InvalidSelector(selector.to_string())
        })?;
        Ok(self.html.select(&parsed).map(HtmlNode).collect())
    }
}

/// An element of an [`HtmlDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlNode<'a>(ElementRef<'a>);

impl<'a> HtmlNode<'a> {
    pub fn element(&self) -> ElementRef<'a> {
        self.0
    }

    /// Whitespace-collapsed text content.
    pub fn text(&self) -> String {
        self.0
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DomNode for HtmlNode<'_> {
    fn tag_name(&self) -> String {
        self.0.value().name().to_ascii_lowercase()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.0.value().attr(name).map(str::to_string)
    }

    fn parent_element(&self) -> Option<Self> {
        self.0.parent().and_then(ElementRef::wrap).map(HtmlNode)
    }

    fn element_siblings(&self) -> Vec<Self> {
        match self.0.parent() {
            Some(parent) => parent
                .children()
                .filter_map(ElementRef::wrap)
                .map(HtmlNode)
                .collect(),
            None => vec![*self],
        }
    }
}
