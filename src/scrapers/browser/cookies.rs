//! Identity cookie injection for browser sessions.

use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::models::SessionCookie;

/// Set the identity's cookies on a page before it navigates anywhere.
///
/// A cookie that fails to build or set is skipped; the session then simply
/// behaves as logged out for that cookie.
pub(crate) async fn inject_cookies(page: &Page, cookies: &[SessionCookie]) -> usize {
    let mut injected = 0;

    for cookie in cookies {
        if cookie.name.is_empty() || cookie.domain.is_empty() {
            continue;
        }

        let cookie_param = CookieParam::builder()
            .name(cookie.name.as_str())
            .value(cookie.value.as_str())
            .domain(cookie.domain.as_str())
            .path(cookie.path.as_str())
            .secure(cookie.secure)
            .http_only(cookie.http_only)
            .build();

        match cookie_param {
            Ok(param) => match page.set_cookie(param).await {
                Ok(_) => injected += 1,
                Err(e) => warn!("Failed to set cookie {}: {}", cookie.name, e),
            },
            Err(e) => {
                warn!("Failed to build cookie {}: {}", cookie.name, e);
            }
        }
    }

    debug!("Injected {}/{} identity cookies", injected, cookies.len());
    injected
}
