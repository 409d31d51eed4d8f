//! Opening a page loader for an identity.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CrawlResult;
use crate::models::Identity;
use crate::scrapers::browser::{BrowserEngineConfig, BrowserSession, PageLoader};
use crate::scrapers::egress::EgressProvider;

/// Opens one page loader bound to an identity.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, identity: &Identity) -> CrawlResult<Box<dyn PageLoader>>;

    /// Move later sessions to a fresh egress. Returns its label.
    async fn rotate(&self) -> String;
}

/// Launches a Chrome session per identity behind the shared egress.
pub struct BrowserSessionFactory {
    config: BrowserEngineConfig,
    egress: Arc<dyn EgressProvider>,
}

impl BrowserSessionFactory {
    pub fn new(config: BrowserEngineConfig, egress: Arc<dyn EgressProvider>) -> Self {
        Self { config, egress }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self, identity: &Identity) -> CrawlResult<Box<dyn PageLoader>> {
        let egress = self.egress.current().await;
        let session = BrowserSession::open(&self.config, Some(identity), &egress).await?;
        Ok(Box::new(session))
    }

    async fn rotate(&self) -> String {
        self.egress.rotate().await.label
    }
}
