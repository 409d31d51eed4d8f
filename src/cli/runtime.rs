//! Wiring settings into stores, clients and services.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Settings;
use crate::discovery::DiscoveryEngine;
use crate::repository::{SqliteQueueStore, SqliteRecordStore};
use crate::scrapers::egress::{egress_from_settings, EgressProvider};
use crate::scrapers::rate_limiter::RateLimiter;
use crate::scrapers::{PlatformClient, ReqwestTransport, ResilientClient};

/// Everything a command needs, built once from settings.
pub struct Runtime {
    pub settings: Settings,
    pub queue: Arc<SqliteQueueStore>,
    pub records: Arc<SqliteRecordStore>,
    pub egress: Arc<dyn EgressProvider>,
    pub platform: Arc<PlatformClient>,
}

impl Runtime {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let db = &settings.database_path;
        let queue = Arc::new(
            SqliteQueueStore::new(db)
                .with_context(|| format!("Failed to open queue database {}", db.display()))?,
        );
        let records = Arc::new(
            SqliteRecordStore::new(db)
                .with_context(|| format!("Failed to open record database {}", db.display()))?,
        );

        let egress =
            egress_from_settings(settings.proxy_url.as_deref(), settings.rotation_url.clone())?;
        let transport = Arc::new(ReqwestTransport::new(
            settings.request_timeout(),
            settings.user_agent.as_deref(),
        ));
        let client = ResilientClient::new(
            transport,
            Arc::clone(&egress),
            RateLimiter::with_config(settings.rate_limit_config()),
            settings.retry.clone(),
        );
        let platform = Arc::new(PlatformClient::with_base_url(client, &settings.base_url));

        info!("Using database {}", settings.database_path.display());
        Ok(Self {
            settings,
            queue,
            records,
            egress,
            platform,
        })
    }

    pub fn discovery_engine(&self) -> DiscoveryEngine {
        DiscoveryEngine::new(
            self.platform.clone(),
            self.queue.clone(),
            self.records.clone(),
            self.settings.discovery,
        )
    }
}

/// A receiver that turns true on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight targets");
            let _ = tx.send(true);
            // Keep the sender alive so receivers see `true`, not a closed channel.
            tx.closed().await;
        }
    });
    rx
}
