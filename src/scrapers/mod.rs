//! Network-facing clients: the resilient JSON fetcher, the egress
//! providers it rotates through, and the automated browser.

pub mod browser;
pub mod egress;
mod http_client;
pub mod platform;
pub mod rate_limiter;

pub use browser::{BrowserEngineConfig, NavigationMode, PageLoad, PageLoader};
pub use egress::{DirectEgress, EgressIdentity, EgressProvider, ProxyEgress};
pub use http_client::{
    classify, looks_blocked, random_user_agent, resolve_user_agent, RawResponse,
    ReqwestTransport, ResilientClient, RetryPolicy, Transport, IMPERSONATE_USER_AGENTS,
    USER_AGENT,
};
pub use platform::{ContentSource, PlatformClient};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
