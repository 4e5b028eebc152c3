//! Structural selector composition.
//!
//! [`compose`] walks from an element up to the document root and renders the
//! tag path as a selector string. Tags that have same-tag siblings get an
//! `:nth-child(k)` disambiguator, where `k` is the element's 1-based position
//! among all element children of its parent, so the selector resolves to the
//! clicked element and nothing else.
//!
//! ```
//! use sift_core::compose::{compose, ComposeOptions};
//! use sift_core::testutil::MockDocument;
//!
//! let mut doc = MockDocument::new("html");
//! let body = doc.append(0, "body", &[]);
//! let ul = doc.append(body, "ul", &[]);
//! doc.append(ul, "li", &[]);
//! let second = doc.append(ul, "li", &[]);
//!
//! let selector = compose(&doc.node(second), ComposeOptions::default());
//! assert_eq!(selector, "html > body > ul > li:nth-child(2)");
//! ```

use crate::traits::DomNode;

/// How consecutive path segments are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    /// `a > b`: every segment is the direct parent of the next one.
    #[default]
    Child,
    /// `a b`: the historical single-space form. Shorter, but a full path can
    /// also match nested look-alikes.
    Descendant,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::Child => " > ",
            Combinator::Descendant => " ",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Stop at the first ancestor-or-self with a non-empty `id` and anchor
    /// the selector there.
    pub prefer_id: bool,
    pub combinator: Combinator,
}

impl ComposeOptions {
    pub fn prefer_id(mut self) -> Self {
        self.prefer_id = true;
        self
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }
}

/// Derive the structural selector of `node`.
pub fn compose<N: DomNode>(node: &N, options: ComposeOptions) -> String {
    let mut segments = Vec::new();
    let mut current = Some(node.clone());

    while let Some(element) = current {
        if options.prefer_id
            && let Some(id) = non_empty_attr(&element, "id")
        {
            segments.push(format!("#{}", escape_ident(&id)));
            break;
        }
        segments.push(segment(&element));
        current = element.parent_element();
    }

    segments.reverse();
    segments.join(options.combinator.as_str())
}

fn segment<N: DomNode>(element: &N) -> String {
    let tag = element.tag_name();
    let siblings = element.element_siblings();
    let same_tag = siblings.iter().filter(|s| s.tag_name() == tag).count();

    if same_tag > 1
        && let Some(position) = siblings.iter().position(|s| s == element)
    {
        return format!("{tag}:nth-child({})", position + 1);
    }
    tag
}

fn non_empty_attr<N: DomNode>(node: &N, name: &str) -> Option<String> {
    node.attr(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Escape a value for use as a CSS identifier (`#id`).
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            'a'..='z' | 'A'..='Z' | '_' | '-' => out.push(c),
            c if !c.is_ascii() => out.push(c),
            '0'..='9' if i > 0 => out.push(c),
            // leading digits need the code point form, followed by a space
            '0'..='9' => out.push_str(&format!("\\{:x} ", c as u32)),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

/// What the authoring UI learns from hovering an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub selector: String,
    pub element_id: Option<String>,
    pub element_class: Option<String>,
    /// Set when the element is, or sits inside, a hyperlink.
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: Option<String>,
}

impl Candidate {
    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }

    /// Attribute a new rule should read by default: links bind their target,
    /// everything else binds text.
    pub fn suggested_attribute(&self) -> Option<&'static str> {
        self.link.as_ref().map(|_| "href")
    }
}

/// Compose the selector of `node` and collect its id/class hints.
pub fn describe<N: DomNode>(node: &N, options: ComposeOptions) -> Candidate {
    Candidate {
        selector: compose(node, options),
        element_id: non_empty_attr(node, "id"),
        element_class: non_empty_attr(node, "class"),
        link: enclosing_link(node),
    }
}

fn enclosing_link<N: DomNode>(node: &N) -> Option<Link> {
    let mut current = Some(node.clone());
    while let Some(element) = current {
        if element.tag_name() == "a" {
            return Some(Link {
                href: non_empty_attr(&element, "href"),
            });
        }
        current = element.parent_element();
    }
    None
}
