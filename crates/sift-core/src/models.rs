use serde::{Deserialize, Serialize};

/// Identifier assigned to a rule by the pattern store.
pub type RuleId = i64;

/// Identifier of a crawled page.
pub type PageId = i64;

/// A crawl target grouping, with the credentials needed to load its pages
/// through the sandbox proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    /// Raw `Cookie` header value sent with page loads.
    pub cookies: Option<String>,
}

/// A page of a [`Site`] that rules are authored against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: i64,
    pub name: String,
    pub url: String,
    /// Login pages carry input-value rules only.
    #[serde(default)]
    pub is_login_page: bool,
}

/// A stored rule node.
///
/// `selector` is relative to the elements matched by the parent rule, or to
/// the document root for top-level rules. See
/// [`PatternTree::effective_selector`](crate::tree::PatternTree::effective_selector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: RuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<PageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_pattern: Option<RuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_attribute_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default)]
    pub sub_patterns: Vec<Pattern>,
}

impl Pattern {
    pub fn is_top_level(&self) -> bool {
        self.parent_pattern.is_none()
    }
}

/// Request body for creating a rule (`POST /rules`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<PageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_pattern: Option<RuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_attribute_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
}

impl NewPattern {
    /// A rule anchored at the document root of `page`.
    pub fn top_level(page: PageId, selector: impl Into<String>) -> Self {
        Self {
            source_page: Some(page),
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    /// A rule nested under `parent`.
    pub fn child_of(parent: RuleId, selector: impl Into<String>) -> Self {
        Self {
            parent_pattern: Some(parent),
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    /// Materialize the stored record once the store has assigned an id.
    pub fn into_pattern(self, id: RuleId) -> Pattern {
        Pattern {
            id,
            source_page: self.source_page,
            parent_pattern: self.parent_pattern,
            name: self.name,
            selector: self.selector.unwrap_or_default(),
            element_id: self.element_id,
            element_class: self.element_class,
            mapped_type: self.mapped_type,
            mapped_attribute: self.mapped_attribute,
            mapped_attribute_function: self.mapped_attribute_function,
            input_value: self.input_value,
            sub_patterns: Vec::new(),
        }
    }
}

/// Result of triggering server-side extraction for one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub rule_id: RuleId,
    pub status_code: u16,
    /// Body of the executor's response, relayed as-is.
    pub message: Option<String>,
}
