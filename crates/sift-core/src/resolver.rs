//! Folding newly observed selectors into a page's rule tree.
//!
//! A rule authored from one clicked element is over-specific: it encodes
//! "the 3rd item" rather than "every item". The resolver drops positional
//! disambiguators where that is safe and decides whether a new observation
//! extends an existing rule or starts a new top-level one.

use crate::binding::Binding;
use crate::error::AppError;
use crate::models::{NewPattern, PageId, Pattern, RuleId};
use crate::traits::PatternStore;

/// How a new selector is tested against existing top-level rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReuseMatching {
    /// The rule's selector must be a leading prefix of the new selector that
    /// ends on a segment boundary. The longest such rule wins.
    #[default]
    StructuralPrefix,
    /// Plain substring containment; the last matching rule wins. Under this
    /// mode a rule `l > li` covers `ul > li`, and matches in the middle of
    /// the selector count.
    Substring,
}

impl ReuseMatching {
    pub fn matches(self, candidate: &str, selector: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        match self {
            ReuseMatching::Substring => selector.contains(candidate),
            ReuseMatching::StructuralPrefix => selector
                .strip_prefix(candidate)
                .is_some_and(at_boundary),
        }
    }

    /// `full` relative to `base` under this mode.
    ///
    /// Structural matching only accepts a true prefix. Substring matching
    /// falls back to removing the first occurrence of `base`, then drops the
    /// combinator left dangling by the cut.
    pub fn child_path(self, base: &str, full: &str) -> Result<String, AppError> {
        match child_path(base, full) {
            Err(_) if self == ReuseMatching::Substring && self.matches(base.trim(), full) => {
                Ok(collapse_combinators(&full.trim().replacen(base.trim(), "", 1)))
            }
            result => result,
        }
    }
}

impl std::str::FromStr for ReuseMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix" | "structural" => Ok(ReuseMatching::StructuralPrefix),
            "substring" => Ok(ReuseMatching::Substring),
            other => Err(format!(
                "unknown reuse matching '{other}' (expected 'prefix' or 'substring')"
            )),
        }
    }
}

/// Optional data carried onto the rule created for the clicked element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternHints {
    pub name: Option<String>,
    pub element_id: Option<String>,
    pub element_class: Option<String>,
    pub binding: Option<Binding>,
}

impl PatternHints {
    fn apply(&self, mut rule: NewPattern) -> NewPattern {
        rule.name = self.name.clone();
        rule.element_id = self.element_id.clone();
        rule.element_class = self.element_class.clone();
        if let Some(binding) = &self.binding {
            binding.apply(&mut rule);
        }
        rule
    }
}

/// Result of [`SubpatternResolver::add_subpattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct Subpattern {
    pub parent_id: RuleId,
    /// Selector stored on the parent after generalization.
    pub parent_selector: String,
    pub child: Pattern,
    /// False when an identical child already existed and was returned as-is.
    pub created: bool,
}

/// Result of [`SubpatternResolver::add_source_pattern`].
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// The observation was folded under an existing top-level rule.
    Reused(Subpattern),
    /// No existing rule covered it; a new top-level rule was created.
    Created(Pattern),
    /// The generalized selector equals an existing top-level rule, which is
    /// returned unchanged. Nothing was written.
    Existing(Pattern),
}

impl Placement {
    /// The rule that represents the clicked element.
    pub fn rule(&self) -> &Pattern {
        match self {
            Placement::Reused(sub) => &sub.child,
            Placement::Created(pattern) | Placement::Existing(pattern) => pattern,
        }
    }
}

/// Decides where a new selector goes in the rule tree and persists it.
#[derive(Clone)]
pub struct SubpatternResolver<S: PatternStore> {
    store: S,
    matching: ReuseMatching,
}

impl<S: PatternStore> SubpatternResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            matching: ReuseMatching::default(),
        }
    }

    pub fn with_matching(mut self, matching: ReuseMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fold `full` under the rule `parent_id` whose selector is `base`.
    ///
    /// With `reuse`, the parent is kept as-is and the child loses its leading
    /// positional disambiguator. Without it, the parent is generalized
    /// instead. The parent update is acknowledged before the child is
    /// created; an existing child with the same selector is returned rather
    /// than duplicated.
    pub async fn add_subpattern(
        &self,
        base: &str,
        full: &str,
        parent_id: RuleId,
        reuse: bool,
        hints: &PatternHints,
    ) -> Result<Subpattern, AppError> {
        let mut child = self.matching.child_path(base, full)?;
        let parent_selector = if reuse {
            child = strip_leading_disambiguator(&child).to_string();
            base.trim().to_string()
        } else {
            generalize(base)
        };
        let child = strip_leading_combinator(&child).to_string();

        self.store
            .update_selector(parent_id, &parent_selector)
            .await?;
        tracing::debug!(%parent_id, selector = %parent_selector, "Parent selector stored");

        let existing = self.store.list_children(parent_id).await?;
        if let Some(found) = existing.into_iter().find(|c| c.selector == child) {
            tracing::info!(
                %parent_id,
                rule_id = %found.id,
                child = %child,
                "Child rule already present, nothing created"
            );
            return Ok(Subpattern {
                parent_id,
                parent_selector,
                child: found,
                created: false,
            });
        }

        let rule = hints.apply(NewPattern::child_of(parent_id, child.as_str()));
        let created = self.store.create(&rule).await?;
        tracing::info!(%parent_id, rule_id = %created.id, child = %child, "Child rule created");

        Ok(Subpattern {
            parent_id,
            parent_selector,
            child: created,
            created: true,
        })
    }

    /// Place a selector observed on `page` with no explicit parent.
    ///
    /// Scans the page's top-level rules for one that covers `selector`; if
    /// found, folds the selector under it in reuse mode. Otherwise creates a
    /// new top-level rule with the generalized selector, unless a top-level
    /// rule with that exact selector already exists.
    pub async fn add_source_pattern(
        &self,
        page: PageId,
        selector: &str,
        hints: &PatternHints,
    ) -> Result<Placement, AppError> {
        let selector = selector.trim();
        let rules = self.store.list_for_page(page).await?;

        if let Some(parent) = self.find_reuse_target(&rules, selector) {
            tracing::info!(
                %page,
                parent_id = %parent.id,
                parent = %parent.selector,
                "Reusing existing rule"
            );
            let sub = self
                .add_subpattern(&parent.selector, selector, parent.id, true, hints)
                .await?;
            return Ok(Placement::Reused(sub));
        }

        let generalized = generalize(selector);
        if let Some(existing) = rules.iter().find(|r| r.selector.trim() == generalized) {
            tracing::info!(
                %page,
                rule_id = %existing.id,
                selector = %generalized,
                "Top-level rule already present, nothing created"
            );
            return Ok(Placement::Existing(existing.clone()));
        }

        let rule = hints.apply(NewPattern::top_level(page, generalized.as_str()));
        let created = self.store.create(&rule).await?;
        tracing::info!(%page, rule_id = %created.id, selector = %generalized, "Top-level rule created");

        Ok(Placement::Created(created))
    }

    fn find_reuse_target<'a>(&self, rules: &'a [Pattern], selector: &str) -> Option<&'a Pattern> {
        let matches: Vec<&Pattern> = rules
            .iter()
            .filter(|rule| self.matching.matches(&rule.selector, selector))
            .collect();

        if matches.len() > 1 {
            tracing::debug!(
                candidates = ?matches.iter().map(|r| r.id).collect::<Vec<_>>(),
                "Several rules cover the selector"
            );
        }

        match self.matching {
            ReuseMatching::Substring => matches.last().copied(),
            // max_by_key keeps the last of equally long selectors
            ReuseMatching::StructuralPrefix => {
                matches.into_iter().max_by_key(|rule| rule.selector.len())
            }
        }
    }
}

/// `full` with the leading `base` removed, left-trimmed.
///
/// `base` must be a prefix of `full` ending on a segment boundary;
/// anything else is a [`AppError::SelectorMismatch`].
pub fn child_path(base: &str, full: &str) -> Result<String, AppError> {
    let base = base.trim();
    let full = full.trim();
    match full.strip_prefix(base) {
        Some(rest) if base.is_empty() || at_boundary(rest) => Ok(rest.trim_start().to_string()),
        _ => Err(AppError::SelectorMismatch {
            base: base.to_string(),
            full: full.to_string(),
        }),
    }
}

/// Re-root `full`, a document-rooted selector, below a chain of rule
/// selectors given top-level first.
///
/// Each level must be a structural prefix of what remains. The positional
/// disambiguator the clicked path carries at that level is dropped with it,
/// since the stored rule is already general there.
pub fn descend<'a, I>(chain: I, full: &str) -> Result<String, AppError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut rest = full.trim().to_string();
    for selector in chain {
        let child = child_path(selector, &rest)?;
        rest = strip_leading_combinator(strip_leading_disambiguator(&child)).to_string();
    }
    Ok(rest)
}

fn at_boundary(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '>' | '+' | '~' | ':'),
    }
}

fn is_combinator(token: &str) -> bool {
    matches!(token, ">" | "+" | "~")
}

/// Normalize whitespace and drop combinators with no compound on their left,
/// or none on their right.
fn collapse_combinators(path: &str) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in path.split_whitespace() {
        if is_combinator(token) && tokens.last().is_none_or(|t| is_combinator(t)) {
            continue;
        }
        tokens.push(token);
    }
    if tokens.last().is_some_and(|t| is_combinator(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Drop one leading colon token (`:nth-child(2)`) and the whitespace after it.
pub fn strip_leading_disambiguator(path: &str) -> &str {
    if !path.starts_with(':') {
        return path;
    }
    match token_end(path, 0) {
        end if end >= path.len() => "",
        end => path[end..].trim_start(),
    }
}

/// Drop a leading combinator token (`>`, `+`, `~`).
pub fn strip_leading_combinator(path: &str) -> &str {
    let path = path.trim_start();
    match path.strip_prefix(['>', '+', '~']) {
        Some(rest) => rest.trim_start(),
        None => path,
    }
}

/// Remove the last colon-prefixed disambiguator from `selector`.
///
/// Segments after the removed token are kept, so only positional
/// specificity is lost, never structure.
pub fn generalize(selector: &str) -> String {
    let selector = selector.trim();
    let Some(start) = colon_tokens(selector).last().copied() else {
        return selector.to_string();
    };
    let end = token_end(selector, start);
    let generalized = format!("{}{}", &selector[..start], &selector[end..]);
    generalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offsets of `:` characters that start a pseudo-class token, ignoring
/// colons nested inside parentheses or attribute brackets.
fn colon_tokens(selector: &str) -> Vec<usize> {
    let mut depth = 0usize;
    let mut starts = Vec::new();
    for (i, c) in selector.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => starts.push(i),
            _ => {}
        }
    }
    starts
}

/// End offset of the colon token starting at `start`: the next top-level
/// whitespace, combinator, or colon, or the end of the string.
fn token_end(selector: &str, start: usize) -> usize {
    let mut depth = 0usize;
    for (i, c) in selector[start..].char_indices().skip(1) {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            c if depth == 0 && (c.is_whitespace() || matches!(c, ':' | '>' | '+' | '~')) => {
                return start + i;
            }
            _ => {}
        }
    }
    selector.len()
}
