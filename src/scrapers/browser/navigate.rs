//! Navigation primitives: request interception, readiness, status and consent.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::consent::{click_script, CONSENT_ACTIONS};
use super::types::NavigationMode;
use crate::error::{CrawlError, CrawlResult};

/// Resource types dropped in lean mode.
const BLOCKED_RESOURCES: &[ResourceType] = &[
    ResourceType::Image,
    ResourceType::Font,
    ResourceType::Stylesheet,
    ResourceType::Media,
];

/// Resolves once the DOM is usable, with a fallback timeout.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Main-document status from Navigation Timing. Older engines lack
/// `responseStatus`; those report 200.
const NAVIGATION_STATUS_SCRIPT: &str = r#"
    (() => {
        const entry = performance.getEntriesByType('navigation')[0];
        return entry && entry.responseStatus ? entry.responseStatus : 200;
    })()
"#;

pub(crate) fn browser_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Browser(e.to_string())
}

/// Proxy credentials answered on auth challenges.
#[derive(Clone)]
pub(crate) struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Turn on Fetch-domain interception for this page.
///
/// Lean mode fails image, font, stylesheet and media requests. Proxy
/// credentials, when present, require intercepting every request so auth
/// challenges can be answered. Returned tasks end when the page closes.
pub(crate) async fn enable_interception(
    page: &Page,
    mode: NavigationMode,
    proxy_auth: Option<ProxyAuth>,
) -> CrawlResult<Vec<JoinHandle<()>>> {
    let block = mode.blocks_resources();
    if !block && proxy_auth.is_none() {
        return Ok(Vec::new());
    }

    let mut params = EnableParams::builder();
    if proxy_auth.is_some() {
        params = params
            .pattern(RequestPattern::builder().url_pattern("*").build())
            .handle_auth_requests(true);
    } else {
        for resource in BLOCKED_RESOURCES {
            params = params.pattern(RequestPattern::builder().resource_type(resource.clone()).build());
        }
    }

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(browser_err)?;
    let mut tasks = Vec::new();

    let paused_page = page.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let drop_it = block && BLOCKED_RESOURCES.contains(&event.resource_type);
            let result = if drop_it {
                paused_page
                    .execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
            } else {
                paused_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = result {
                debug!("Interception response failed: {}", e);
            }
        }
    }));

    if let Some(auth) = proxy_auth {
        let mut challenges = page
            .event_listener::<EventAuthRequired>()
            .await
            .map_err(browser_err)?;
        let auth_page = page.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = challenges.next().await {
                let response = AuthChallengeResponse::builder()
                    .response(AuthChallengeResponseResponse::ProvideCredentials)
                    .username(auth.username.clone())
                    .password(auth.password.clone())
                    .build();
                let response = match response {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Failed to build proxy auth response: {}", e);
                        continue;
                    }
                };
                if let Err(e) = auth_page
                    .execute(ContinueWithAuthParams::new(event.request_id.clone(), response))
                    .await
                {
                    debug!("Proxy auth response failed: {}", e);
                }
            }
        }));
    }

    page.execute(params.build()).await.map_err(browser_err)?;
    Ok(tasks)
}

/// Wait for DOM readiness. Timeouts and script failures are logged, not fatal.
pub(crate) async fn wait_until_ready(page: &Page, timeout: Duration) {
    match tokio::time::timeout(timeout, page.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await {
        Ok(Ok(result)) => {
            let state: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page ready state: {}", state);
        }
        Ok(Err(e)) => debug!("Could not check ready state: {}", e),
        Err(_) => warn!("Timeout waiting for page ready state"),
    }
}

/// Wait for `selector` to appear. Absence is not an error.
pub(crate) async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> bool {
    let poll = Duration::from_millis(500);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if page.find_element(selector).await.is_ok() {
            debug!("Selector found: {}", selector);
            return true;
        }
        if tokio::time::Instant::now() + poll > deadline {
            debug!("Selector not found before timeout: {}", selector);
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

pub(crate) async fn navigation_status(page: &Page) -> u16 {
    match page.evaluate(NAVIGATION_STATUS_SCRIPT.to_string()).await {
        Ok(result) => result.into_value::<u16>().unwrap_or(200),
        Err(e) => {
            debug!("Navigation status unavailable: {}", e);
            200
        }
    }
}

/// Try every dismissal action once. Returns how many clicked.
pub(crate) async fn dismiss_consent(page: &Page) -> usize {
    let mut clicked = 0;
    for action in CONSENT_ACTIONS {
        match page.evaluate(click_script(*action)).await {
            Ok(result) => {
                if result.into_value::<bool>().unwrap_or(false) {
                    debug!("Dismissed interstitial via {:?}", action);
                    clicked += 1;
                    tokio::time::sleep(Duration::from_millis(750)).await;
                }
            }
            Err(e) => debug!("Consent action {:?} skipped: {}", action, e),
        }
    }
    clicked
}
