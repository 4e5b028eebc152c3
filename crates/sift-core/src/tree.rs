use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::AppError;
use crate::models::{PageId, Pattern, RuleId};
use crate::traits::PatternStore;

/// One rendered line of the rule tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: RuleId,
    /// 0 for top-level rules.
    pub depth: usize,
    pub selector: String,
    pub effective_selector: String,
}

/// The rules of one page, nested by parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternTree {
    page: PageId,
    roots: Vec<Pattern>,
}

impl PatternTree {
    pub fn new(page: PageId) -> Self {
        Self {
            page,
            roots: Vec::new(),
        }
    }

    /// Build the tree from rules linked by `parent_pattern`.
    ///
    /// Rules may also arrive already nested in `sub_patterns`. Order within a
    /// parent follows input order. Rules whose parent is not in the input are
    /// dropped.
    pub fn from_rules(page: PageId, rules: Vec<Pattern>) -> Self {
        let mut flat = Vec::new();
        let mut seen = HashSet::new();
        for rule in rules {
            flatten(rule, &mut flat, &mut seen);
        }

        let known: HashSet<RuleId> = flat.iter().map(|r| r.id).collect();
        let mut roots = Vec::new();
        let mut children: HashMap<RuleId, Vec<Pattern>> = HashMap::new();
        for rule in flat {
            match rule.parent_pattern {
                None => roots.push(rule),
                Some(parent) if known.contains(&parent) => {
                    children.entry(parent).or_default().push(rule)
                }
                Some(parent) => {
                    tracing::warn!(rule_id = %rule.id, %parent, "Dropping rule with unknown parent");
                }
            }
        }

        let roots = roots
            .into_iter()
            .map(|root| attach(root, &mut children))
            .collect();
        Self { page, roots }
    }

    /// Fetch a page's rules from the store, level by level.
    pub async fn load<S: PatternStore>(store: &S, page: PageId) -> Result<Self, AppError> {
        let mut rules = store.list_for_page(page).await?;
        let mut seen: HashSet<RuleId> = rules.iter().map(|r| r.id).collect();
        let mut queue: VecDeque<RuleId> = rules.iter().map(|r| r.id).collect();

        while let Some(parent) = queue.pop_front() {
            for mut child in store.list_children(parent).await? {
                if !seen.insert(child.id) {
                    continue;
                }
                child.parent_pattern.get_or_insert(parent);
                queue.push_back(child.id);
                rules.push(child);
            }
        }

        let tree = Self::from_rules(page, rules);
        tracing::debug!(%page, rules = tree.len(), "Pattern tree loaded");
        Ok(tree)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn roots(&self) -> &[Pattern] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        fn count(nodes: &[Pattern]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.sub_patterns)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, id: RuleId) -> Option<&Pattern> {
        self.path_to(id).and_then(|path| path.last().copied())
    }

    /// The chain from the top-level rule down to `id`, inclusive.
    pub fn path_to(&self, id: RuleId) -> Option<Vec<&Pattern>> {
        let mut trail = Vec::new();
        walk_path(&self.roots, id, &mut trail).then_some(trail)
    }

    /// Ancestors of `id`, top-level first, excluding the rule itself.
    pub fn ancestors(&self, id: RuleId) -> Option<Vec<&Pattern>> {
        self.path_to(id).map(|mut path| {
            path.pop();
            path
        })
    }

    /// The selector that matches `id`'s elements in the live document: every
    /// ancestor's selector followed by its own, joined by a single space.
    pub fn effective_selector(&self, id: RuleId) -> Option<String> {
        self.path_to(id)
            .map(|path| join_selectors(path.iter().map(|p| p.selector.as_str())))
    }

    /// Depth-first render rows.
    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::with_capacity(self.len());
        collect_rows(&self.roots, 0, "", &mut rows);
        rows
    }

    /// Add a freshly created rule under its parent (or at the top level).
    pub fn insert(&mut self, pattern: Pattern) -> Result<(), AppError> {
        match pattern.parent_pattern {
            None => self.roots.push(pattern),
            Some(parent) => find_mut(&mut self.roots, parent)
                .ok_or(AppError::NotFound(parent))?
                .sub_patterns
                .push(pattern),
        }
        Ok(())
    }

    pub fn set_selector(&mut self, id: RuleId, selector: &str) -> Result<(), AppError> {
        let node = find_mut(&mut self.roots, id).ok_or(AppError::NotFound(id))?;
        node.selector = selector.to_string();
        Ok(())
    }

    /// Detach `id` and everything below it. Returns the removed ids, deepest
    /// first; empty when `id` is not in the tree.
    pub fn remove_subtree(&mut self, id: RuleId) -> Vec<RuleId> {
        take(&mut self.roots, id)
            .map(|removed| subtree_ids(&removed))
            .unwrap_or_default()
    }
}

/// Join selector parts with the descendant combinator, skipping empty parts.
pub fn join_selectors<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ids of `pattern` and its descendants, deepest first.
pub fn subtree_ids(pattern: &Pattern) -> Vec<RuleId> {
    let mut ids = Vec::new();
    post_order(pattern, &mut ids);
    ids
}

/// Delete `id` and its subtree from the store (children first), then from
/// `tree`. On a store failure the tree is left untouched.
pub async fn delete_pattern<S: PatternStore>(
    store: &S,
    tree: &mut PatternTree,
    id: RuleId,
) -> Result<Vec<RuleId>, AppError> {
    let ids = tree.find(id).map(subtree_ids).ok_or(AppError::NotFound(id))?;
    for rule in &ids {
        store.delete(*rule).await?;
    }
    tree.remove_subtree(id);
    tracing::info!(rule_id = %id, removed = ids.len(), "Rule subtree deleted");
    Ok(ids)
}

fn flatten(mut rule: Pattern, out: &mut Vec<Pattern>, seen: &mut HashSet<RuleId>) {
    if !seen.insert(rule.id) {
        return;
    }
    let subs = std::mem::take(&mut rule.sub_patterns);
    let id = rule.id;
    out.push(rule);
    for mut sub in subs {
        sub.parent_pattern.get_or_insert(id);
        flatten(sub, out, seen);
    }
}

fn attach(mut node: Pattern, children: &mut HashMap<RuleId, Vec<Pattern>>) -> Pattern {
    let kids = children.remove(&node.id).unwrap_or_default();
    node.sub_patterns = kids.into_iter().map(|k| attach(k, children)).collect();
    node
}

fn walk_path<'a>(nodes: &'a [Pattern], id: RuleId, trail: &mut Vec<&'a Pattern>) -> bool {
    for node in nodes {
        trail.push(node);
        if node.id == id || walk_path(&node.sub_patterns, id, trail) {
            return true;
        }
        trail.pop();
    }
    false
}

fn find_mut(nodes: &mut [Pattern], id: RuleId) -> Option<&mut Pattern> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.sub_patterns, id) {
            return Some(found);
        }
    }
    None
}

fn take(nodes: &mut Vec<Pattern>, id: RuleId) -> Option<Pattern> {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        return Some(nodes.remove(pos));
    }
    nodes.iter_mut().find_map(|n| take(&mut n.sub_patterns, id))
}

fn post_order(pattern: &Pattern, out: &mut Vec<RuleId>) {
    for sub in &pattern.sub_patterns {
        post_order(sub, out);
    }
    out.push(pattern.id);
}

fn collect_rows(nodes: &[Pattern], depth: usize, prefix: &str, out: &mut Vec<TreeRow>) {
    for node in nodes {
        let effective = join_selectors([prefix, node.selector.as_str()]);
        out.push(TreeRow {
            id: node.id,
            depth,
            selector: node.selector.clone(),
            effective_selector: effective.clone(),
        });
        collect_rows(&node.sub_patterns, depth + 1, &effective, out);
    }
}
