//! Rendered metrics for completed targets.

use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Settings;
use crate::identity::IdentityPool;
use crate::llm::{OllamaClassifier, TargetClassifier};
use crate::scrapers::rate_limiter::RateLimiter;
use crate::services::intel::{BrowserSessionFactory, IntelEvent, MetricsScraper};

use super::super::runtime::{shutdown_on_ctrl_c, Runtime};

pub async fn cmd_intel(settings: Settings, once: bool) -> anyhow::Result<()> {
    let identities = settings.require_identities()?.to_vec();
    let runtime = Runtime::new(settings)?;
    let settings = &runtime.settings;

    let pool = IdentityPool::new(identities);
    let sessions = Arc::new(BrowserSessionFactory::new(
        settings.browser.clone(),
        Arc::clone(&runtime.egress),
    ));

    let mut scraper = MetricsScraper::new(
        runtime.platform.clone(),
        runtime.records.clone(),
        pool.clone(),
        sessions,
        settings.intel.clone(),
    )
    .with_retry(
        settings.retry.clone(),
        RateLimiter::with_config(settings.rate_limit_config()),
    );

    if settings.llm.enabled {
        let classifier = OllamaClassifier::new(settings.llm.clone())?;
        if classifier.is_available().await {
            let classifier: Arc<dyn TargetClassifier> = Arc::new(classifier);
            scraper = scraper.with_classifier(classifier);
        } else {
            warn!(
                "Classifier at {} is not reachable, continuing without labels",
                settings.llm.endpoint
            );
        }
    }

    println!(
        "{} Scraping metrics with {} identities, {} at a time",
        style("→").cyan(),
        pool.len(),
        settings.intel.concurrency
    );

    let (tx, mut rx) = mpsc::channel::<IntelEvent>(128);
    let display = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                IntelEvent::Started { .. } => {}
                IntelEvent::Saved { target, complete } => {
                    let mark = if complete {
                        style("✓").green()
                    } else {
                        style("~").yellow()
                    };
                    println!("  {} r/{}", mark, target);
                }
                IntelEvent::Failed { target, error } => {
                    println!("  {} r/{}: {}", style("✗").red(), target, error);
                }
                IntelEvent::Deferred { target } => {
                    println!("  {} r/{} deferred (no identity free)", style("…").yellow(), target);
                }
            }
        }
    });

    let shutdown = shutdown_on_ctrl_c();
    let limit = settings.intel.limit;
    let mut passes = 0usize;
    let mut total = crate::services::intel::IntelSummary::default();

    loop {
        let summary = scraper.run(limit, Some(tx.clone())).await?;
        passes += 1;
        total.attempted += summary.attempted;
        total.complete += summary.complete;
        total.partial += summary.partial;
        total.failed += summary.failed;
        total.deferred += summary.deferred;

        let progressed = summary.complete + summary.partial + summary.failed;
        if once || progressed == 0 || *shutdown.borrow() {
            break;
        }
    }

    drop(tx);
    let _ = display.await;

    println!(
        "{} {} passes: {} complete, {} partial, {} failed, {} deferred",
        style("✓").green(),
        passes,
        total.complete,
        total.partial,
        total.failed,
        total.deferred
    );
    Ok(())
}
