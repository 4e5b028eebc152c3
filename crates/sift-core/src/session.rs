use crate::binding::Binding;
use crate::compose::{Candidate, ComposeOptions, describe};
use crate::error::AppError;
use crate::highlight::Highlight;
use crate::models::{Page, RuleId, Site};
use crate::resolver::{PatternHints, Placement, SubpatternResolver, child_path, descend};
use crate::traits::{Document, PatternStore};
use crate::tree::PatternTree;

/// Everything one authoring session works against: the active site and page,
/// the document loaded for that page, and the transient pointer state.
pub struct CrawlerSession<D: Document> {
    pub(crate) site: Site,
    pub(crate) page: Page,
    pub(crate) document: D,
    pub(crate) options: ComposeOptions,
    pub(crate) candidate: Option<Candidate>,
    pub(crate) selected_row: Option<RuleId>,
    pub(crate) highlight: Option<Highlight>,
}

impl<D: Document> CrawlerSession<D> {
    pub fn new(site: Site, page: Page, document: D) -> Result<Self, AppError> {
        if page.site_id != site.id {
            return Err(AppError::Generic(format!(
                "page {} belongs to site {}, not {}",
                page.id, page.site_id, site.id
            )));
        }
        Ok(Self {
            site,
            page,
            document,
            options: ComposeOptions::default(),
            candidate: None,
            selected_row: None,
            highlight: None,
        })
    }

    pub fn with_options(mut self, options: ComposeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn options(&self) -> ComposeOptions {
        self.options
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    /// Describe an element of this session's document with the session's
    /// compose options.
    pub fn candidate_for(&self, node: &D::Node<'_>) -> Candidate {
        describe(node, self.options)
    }

    /// Mark a tree row as the parent for the next click, or clear it.
    pub fn select_row(&mut self, row: Option<RuleId>) {
        self.selected_row = row;
    }

    pub fn selected_row(&self) -> Option<RuleId> {
        self.selected_row
    }

    /// Turn the hovered candidate into a rule.
    ///
    /// Without a selected row this is reuse detection against the page's
    /// top-level rules. With one, the candidate is folded under that row: if
    /// the row's selector is already free of the clicked position the child
    /// is generalized (reuse mode), otherwise the row itself is.
    ///
    /// The candidate is consumed only when the store calls succeed; the
    /// caller reloads the tree afterwards.
    pub async fn click<S: PatternStore>(
        &mut self,
        resolver: &SubpatternResolver<S>,
        tree: &PatternTree,
        binding: Option<Binding>,
    ) -> Result<Placement, AppError> {
        let candidate = self.candidate.clone().ok_or(AppError::NoCandidate)?;
        if let Some(binding) = &binding {
            binding.validate_for(&self.page)?;
        }

        let hints = PatternHints {
            name: None,
            element_id: candidate.element_id.clone(),
            element_class: candidate.element_class.clone(),
            binding,
        };

        let placement = match self.selected_row {
            None => {
                resolver
                    .add_source_pattern(self.page.id, &candidate.selector, &hints)
                    .await?
            }
            Some(row) => {
                let path = tree.path_to(row).ok_or(AppError::NotFound(row))?;
                let (parent, ancestors) = path.split_last().ok_or(AppError::NotFound(row))?;
                // Nested rows store selectors relative to their parent, so the
                // document-rooted candidate is re-rooted below the ancestors.
                let full = descend(
                    ancestors.iter().map(|p| p.selector.as_str()),
                    &candidate.selector,
                )?;
                let reuse = child_path(&parent.selector, &full)?.starts_with(':');
                let sub = resolver
                    .add_subpattern(&parent.selector, &full, row, reuse, &hints)
                    .await?;
                Placement::Reused(sub)
            }
        };

        self.candidate = None;
        self.highlight = None;
        Ok(placement)
    }
}
