pub mod binding;
pub mod compose;
pub mod error;
pub mod highlight;
pub mod models;
pub mod resolver;
pub mod session;
pub mod testutil;
pub mod traits;
pub mod tree;

pub use binding::Binding;
pub use compose::{Candidate, Combinator, ComposeOptions, compose, describe};
pub use error::AppError;
pub use highlight::{Highlight, HighlightKind};
pub use models::{ExtractionReport, NewPattern, Page, PageId, Pattern, RuleId, Site};
pub use resolver::{PatternHints, Placement, ReuseMatching, Subpattern, SubpatternResolver};
pub use session::CrawlerSession;
pub use traits::{Document, DomNode, ExtractionTrigger, PageLoader, PatternStore};
pub use tree::{PatternTree, TreeRow, delete_pattern};
