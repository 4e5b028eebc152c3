pub mod config;
pub mod html;
pub mod loader;
pub mod store;

pub use config::ClientConfig;
pub use html::{HtmlDocument, HtmlNode};
pub use loader::ProxyLoader;
pub use store::RestPatternStore;

use sift_core::error::AppError;
use sift_core::models::{Page, Site};
use sift_core::session::CrawlerSession;
use sift_core::traits::PageLoader;

/// Load `page` through `loader` and start an authoring session on it.
pub async fn open_session<L: PageLoader>(
    loader: &L,
    site: Site,
    page: Page,
) -> Result<CrawlerSession<HtmlDocument>, AppError> {
    let html = loader.load(&site, &page).await?;
    let document = HtmlDocument::parse(&html);
    if document.parse_errors() > 0 {
        tracing::debug!(page_id = %page.id, errors = document.parse_errors(), "Markup repaired while parsing");
    }
    CrawlerSession::new(site, page, document)
}
