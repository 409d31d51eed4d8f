//! Retry, rotation and classification behavior of the fetch client.

use std::sync::Arc;
use std::time::Duration;

use frontier::error::CrawlError;
use frontier::scrapers::egress::DirectEgress;
use frontier::scrapers::{RateLimitConfig, RateLimiter, RawResponse, ResilientClient, RetryPolicy};
use frontier::testing::FakeTransport;
use tokio::time::Instant;

const URL: &str = "https://api.example.test/r/rust/new.json";

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        backoff_base: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(30),
        rate_limit_wait: Duration::from_secs(10),
        block_cooldown: Duration::from_secs(60),
    }
}

fn client(transport: Arc<FakeTransport>) -> ResilientClient {
    let limiter = RateLimiter::with_config(RateLimitConfig {
        base_delay: Duration::from_millis(10),
        ..Default::default()
    });
    ResilientClient::new(transport, Arc::new(DirectEgress::new()), limiter, policy())
}

fn generations(transport: &FakeTransport) -> Vec<u64> {
    transport.calls().into_iter().map(|(_, g)| g).collect()
}

#[tokio::test(start_paused = true)]
async fn single_403_is_a_block_without_rotation() {
    let transport = Arc::new(FakeTransport::new([Ok(RawResponse::new(403, "forbidden"))]));
    let client = client(Arc::clone(&transport));

    let err = client.fetch(URL).await.unwrap_err();

    assert!(matches!(err, CrawlError::Blocked { status: 403, .. }));
    assert_eq!(generations(&transport), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn repeated_403s_rotate_and_retry() {
    let transport = Arc::new(FakeTransport::new([
        Ok(RawResponse::new(403, "")),
        Ok(RawResponse::new(403, "")),
        Ok(RawResponse::new(200, r#"{"ok":true}"#)),
    ]));
    let client = client(Arc::clone(&transport));

    assert!(client.fetch(URL).await.is_err());
    let started = Instant::now();
    let payload = client.fetch(URL).await.unwrap();

    assert_eq!(payload.status, 200);
    assert_eq!(generations(&transport), vec![0, 0, 1]);
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_rotates_and_honours_retry_after() {
    let transport = Arc::new(FakeTransport::new([
        Ok(RawResponse::new(429, "").with_header("Retry-After", "7")),
        Ok(RawResponse::new(200, "{}")),
    ]));
    let client = client(Arc::clone(&transport));

    let started = Instant::now();
    client.fetch(URL).await.unwrap();

    assert_eq!(generations(&transport), vec![0, 1]);
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_without_hint_uses_default_wait() {
    let transport = Arc::new(FakeTransport::new([
        Ok(RawResponse::new(429, "")),
        Ok(RawResponse::new(200, "{}")),
    ]));
    let client = client(Arc::clone(&transport));

    let started = Instant::now();
    client.fetch(URL).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_back_off_on_the_same_egress() {
    let transport = Arc::new(FakeTransport::new([
        Err("connection reset".to_string()),
        Ok(RawResponse::new(502, "bad gateway")),
        Ok(RawResponse::new(200, "{}")),
    ]));
    let client = client(Arc::clone(&transport));

    let started = Instant::now();
    client.fetch(URL).await.unwrap();

    assert_eq!(generations(&transport), vec![0, 0, 0]);
    // 1s then 2s of backoff.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_give_up_after_max_attempts() {
    let transport = Arc::new(FakeTransport::new(
        (0..10).map(|_| Ok(RawResponse::new(500, ""))),
    ));
    let client = client(Arc::clone(&transport));

    let err = client.fetch(URL).await.unwrap_err();

    assert!(matches!(err, CrawlError::TransientNetwork { .. }));
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let transport = Arc::new(FakeTransport::new([Ok(RawResponse::new(404, ""))]));
    let client = client(Arc::clone(&transport));

    let err = client.fetch(URL).await.unwrap_err();

    assert!(matches!(err, CrawlError::NotFound { status: 404, .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn block_page_served_with_200_counts_as_blocked() {
    let transport = Arc::new(FakeTransport::new([Ok(RawResponse::new(
        200,
        "<html>You've been blocked by network security.</html>",
    ))]));
    let client = client(Arc::clone(&transport));

    let err = client.fetch(URL).await.unwrap_err();

    assert!(matches!(err, CrawlError::Blocked { .. }));
}
