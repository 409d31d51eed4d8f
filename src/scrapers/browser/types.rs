//! Browser page-load types.

use async_trait::async_trait;

use crate::error::CrawlResult;

/// How much of a page the browser renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// Images, fonts, stylesheets and media are dropped.
    Lean,
    /// Everything is rendered.
    Full,
}

impl NavigationMode {
    pub fn blocks_resources(self) -> bool {
        matches!(self, Self::Lean)
    }
}

/// A rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLoad {
    /// Main-document status. 200 when the engine does not expose it.
    pub status: u16,
    pub html: String,
    pub final_url: String,
}

/// Anything that can render a URL to HTML.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &str, mode: NavigationMode) -> CrawlResult<PageLoad>;

    /// Release the underlying engine.
    async fn close(&self) {}
}
