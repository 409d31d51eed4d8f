//! Rendered-metrics scraper.
//!
//! Metadata (audience, description, rules) comes from the JSON API. Weekly
//! visitors and contributions are only rendered client-side, so each target
//! gets a browser page loaded under a pooled identity. Loads start lean
//! (heavy resources dropped); a blocked lean load is retried with full
//! rendering, and a page with no readable metrics is retried once in full
//! before the record is saved as partial. Rate limits and server errors are
//! retried with waits in the same session; repeated blocks reopen the
//! session behind a rotated egress.

mod session;
mod types;

pub use session::{BrowserSessionFactory, SessionFactory};
pub use types::{IntelConfig, IntelEvent, IntelSummary};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::identity::IdentityPool;
use crate::llm::{ClassificationInput, TargetClassifier};
use crate::models::{
    Classification, FetchOutcome, Identity, ScrapeStatus, ScrapedRecord, TargetInfo,
};
use crate::repository::RecordStore;
use crate::scrapers::browser::{extract_metrics, NavigationMode, PageLoader, PageMetrics};
use crate::scrapers::rate_limiter::{backoff_delay, RateLimiter};
use crate::scrapers::{classify, ContentSource, RawResponse, RetryPolicy};

/// Result of rendering one page in one session.
#[derive(Debug)]
pub enum RenderOutcome {
    Metrics(PageMetrics),
    /// The session's egress looks blocked or throttled. Reopen behind a
    /// fresh egress after `wait`, or give up with `cause`.
    Rotate { cause: CrawlError, wait: Duration },
}

/// Render `url` and read its metrics, escalating and retrying as needed.
///
/// Loads start lean; a blocked lean load is retried with full rendering.
/// Blocks count towards the limiter's consecutive-403 threshold, and
/// crossing it asks the caller to rotate egress. Rate limits wait and retry
/// in the same session until they too reach the threshold. Server errors and
/// loader failures back off exponentially. Every load counts against
/// `policy.max_attempts`. An empty extraction is retried exactly once in full
/// mode and then accepted as is.
pub async fn render_metrics(
    loader: &dyn PageLoader,
    url: &str,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
) -> CrawlResult<RenderOutcome> {
    let domain = RateLimiter::extract_domain(url);
    let max_attempts = policy.max_attempts.max(1);
    let mut mode = NavigationMode::Lean;
    let mut retried_empty = false;
    let mut consecutive_limits: u32 = 0;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let page = match loader.load(url, mode).await {
            Ok(page) => page,
            Err(e) => {
                let wait = transient_wait(url, attempt, max_attempts, policy, e.to_string())?;
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        match classify(RawResponse::new(page.status, page.html.as_str())) {
            FetchOutcome::Success(_) => {}
            FetchOutcome::Blocked { status } => {
                let crossed = match &domain {
                    Some(domain) => limiter.report_403(domain).await,
                    None => false,
                };
                let cause = CrawlError::Blocked {
                    url: url.to_string(),
                    status,
                };
                if crossed {
                    return Ok(RenderOutcome::Rotate {
                        cause,
                        wait: policy.block_cooldown,
                    });
                }
                if mode == NavigationMode::Lean && attempt < max_attempts {
                    warn!("Blocked rendering {} with resource blocking; retrying full", url);
                    mode = NavigationMode::Full;
                    continue;
                }
                return Err(cause);
            }
            FetchOutcome::NotFound { status } => {
                return Err(CrawlError::NotFound {
                    url: url.to_string(),
                    status,
                })
            }
            FetchOutcome::RateLimited { retry_after } => {
                if let Some(domain) = &domain {
                    limiter.report_rate_limit(domain, 429).await;
                }
                consecutive_limits += 1;
                let wait = retry_after.unwrap_or(policy.rate_limit_wait * attempt);
                if consecutive_limits >= limiter.config().block_threshold.max(1)
                    || attempt >= max_attempts
                {
                    return Ok(RenderOutcome::Rotate {
                        cause: CrawlError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt,
                        },
                        wait,
                    });
                }
                warn!(url, attempt, "Rate limited rendering, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }
            FetchOutcome::TransientError { cause, .. } => {
                let wait = transient_wait(url, attempt, max_attempts, policy, cause)?;
                tokio::time::sleep(wait).await;
                continue;
            }
        }

        consecutive_limits = 0;
        if let Some(domain) = &domain {
            limiter.report_success(domain).await;
        }

        let metrics = extract_metrics(&page.html);
        if metrics.is_empty() && !retried_empty {
            debug!("No metrics on {} ({:?}); retrying once in full mode", url, mode);
            retried_empty = true;
            mode = NavigationMode::Full;
            continue;
        }
        return Ok(RenderOutcome::Metrics(metrics));
    }
}

/// Backoff before the next load, or the final error once attempts run out.
fn transient_wait(
    url: &str,
    attempt: u32,
    max_attempts: u32,
    policy: &RetryPolicy,
    cause: String,
) -> CrawlResult<Duration> {
    if attempt >= max_attempts {
        return Err(CrawlError::TransientNetwork {
            url: url.to_string(),
            cause,
        });
    }
    let wait = backoff_delay(attempt - 1, policy.backoff_base, policy.backoff_cap);
    debug!(url, attempt, "Render failed ({}), retrying in {:?}", cause, wait);
    Ok(wait)
}

/// Scrapes rendered metrics for completed targets.
pub struct MetricsScraper {
    source: Arc<dyn ContentSource>,
    records: Arc<dyn RecordStore>,
    pool: IdentityPool,
    sessions: Arc<dyn SessionFactory>,
    classifier: Option<Arc<dyn TargetClassifier>>,
    policy: RetryPolicy,
    limiter: RateLimiter,
    config: IntelConfig,
}

impl MetricsScraper {
    pub fn new(
        source: Arc<dyn ContentSource>,
        records: Arc<dyn RecordStore>,
        pool: IdentityPool,
        sessions: Arc<dyn SessionFactory>,
        config: IntelConfig,
    ) -> Self {
        Self {
            source,
            records,
            pool,
            sessions,
            classifier: None,
            policy: RetryPolicy::default(),
            limiter: RateLimiter::new(),
            config,
        }
    }

    /// Retry knobs and the limiter whose 403 counter drives rotation.
    pub fn with_retry(mut self, policy: RetryPolicy, limiter: RateLimiter) -> Self {
        self.policy = policy;
        self.limiter = limiter;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TargetClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &IntelConfig {
        &self.config
    }

    /// Build the record for one target. Does not persist it.
    pub async fn scrape_target(&self, target: &str) -> CrawlResult<ScrapedRecord> {
        let info = self.source.target_info(target).await?;
        let rules = match self.source.target_rules(target).await {
            Ok(rules) => Some(rules),
            Err(e) => {
                debug!("Rules for r/{} unavailable: {}", target, e);
                None
            }
        };

        let mut guard = self
            .pool
            .acquire(self.config.acquire_timeout)
            .await
            .ok_or(CrawlError::PoolExhausted {
                waited: self.config.acquire_timeout,
            })?;
        debug!("r/{} using identity {}", target, guard.id);

        let url = self.config.page_url(target);
        let rendered = self.render_rotating(&guard, &url).await;
        guard.record_request(rendered.is_ok());
        guard.release();
        let metrics = rendered?;

        let mut record = merge_record(target, &info, rules.as_deref(), metrics);
        if let Some(classifier) = &self.classifier {
            record.classification = self.classify(classifier.as_ref(), &info, rules).await;
        }
        record.finalize();
        Ok(record)
    }

    /// Render in a session for `identity`, reopening behind a fresh egress
    /// up to `max_rotations` times.
    async fn render_rotating(&self, identity: &Identity, url: &str) -> CrawlResult<PageMetrics> {
        let mut rotations = 0;
        loop {
            let loader = self.sessions.open(identity).await?;
            let outcome = render_metrics(loader.as_ref(), url, &self.policy, &self.limiter).await;
            loader.close().await;

            match outcome? {
                RenderOutcome::Metrics(metrics) => return Ok(metrics),
                RenderOutcome::Rotate { cause, wait } => {
                    if rotations >= self.config.max_rotations {
                        return Err(cause);
                    }
                    rotations += 1;
                    let egress = self.sessions.rotate().await;
                    warn!(
                        "{} ({}); rotated egress to {} and cooling down {:?}",
                        url, cause, egress, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn classify(
        &self,
        classifier: &dyn TargetClassifier,
        info: &TargetInfo,
        rules: Option<Vec<String>>,
    ) -> Option<Classification> {
        let recent_posts = self
            .source
            .recent_posts(&info.name, self.config.classify_post_sample)
            .await
            .unwrap_or_default();
        let input = ClassificationInput {
            target: info.name.clone(),
            description: info.description.clone(),
            rules: rules.unwrap_or_default(),
            recent_posts,
        };
        match classifier.classify(&input).await {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Classification of r/{} failed: {}", info.name, e);
                None
            }
        }
    }

    /// Scrape up to `limit` pending targets and persist the results.
    pub async fn run(
        &self,
        limit: usize,
        events: Option<mpsc::Sender<IntelEvent>>,
    ) -> CrawlResult<IntelSummary> {
        let targets = self
            .records
            .pending_targets(limit, self.config.min_audience)
            .await?;
        if targets.is_empty() {
            info!("No completed targets awaiting metrics");
            return Ok(IntelSummary::default());
        }
        info!(
            "Scraping metrics for {} targets ({} at a time, {} identities)",
            targets.len(),
            self.config.concurrency,
            self.pool.len()
        );

        let permits = Semaphore::new(self.config.concurrency.max(1));
        let outcomes = join_all(targets.iter().map(|entry| {
            let permits = &permits;
            let events = events.clone();
            async move {
                let _permit = permits.acquire().await;
                let target = entry.name.as_str();
                emit(&events, IntelEvent::Started {
                    target: target.to_string(),
                })
                .await;
                let result = self.scrape_target(target).await;
                (target, result, events)
            }
        }))
        .await;

        let mut summary = IntelSummary {
            attempted: outcomes.len(),
            ..Default::default()
        };
        for (target, result, events) in outcomes {
            match result {
                Ok(record) => {
                    self.records.upsert_record(&record).await?;
                    let complete = record.status == ScrapeStatus::Complete;
                    if complete {
                        summary.complete += 1;
                    } else {
                        summary.partial += 1;
                    }
                    info!(
                        "r/{}: visitors={:?} contributions={:?} ({})",
                        target,
                        record.weekly_visitors,
                        record.weekly_contributions,
                        record.status.as_str()
                    );
                    emit(&events, IntelEvent::Saved {
                        target: target.to_string(),
                        complete,
                    })
                    .await;
                }
                Err(e) if e.leaves_claim() => {
                    warn!("r/{} deferred: {}", target, e);
                    summary.deferred += 1;
                    emit(&events, IntelEvent::Deferred {
                        target: target.to_string(),
                    })
                    .await;
                }
                Err(CrawlError::Store(e)) => return Err(CrawlError::Store(e)),
                Err(e) => {
                    warn!("r/{} failed: {}", target, e);
                    self.records.mark_failed(target, &e.to_string()).await?;
                    summary.failed += 1;
                    emit(&events, IntelEvent::Failed {
                        target: target.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                }
            }
        }

        Ok(summary)
    }
}

async fn emit(events: &Option<mpsc::Sender<IntelEvent>>, event: IntelEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

/// Combine JSON metadata with rendered metrics. JSON audience wins.
fn merge_record(
    target: &str,
    info: &TargetInfo,
    rules: Option<&[String]>,
    metrics: PageMetrics,
) -> ScrapedRecord {
    let mut record = ScrapedRecord::new(target);
    record.audience = if info.audience > 0 {
        Some(info.audience)
    } else {
        metrics.audience
    };
    if let Some(description) = &info.description {
        record.set_description(description);
    }
    record.rules_count = rules.map(|r| r.len() as i64);
    record.weekly_visitors = metrics.weekly_visitors;
    record.weekly_contributions = metrics.weekly_contributions;
    record
}
