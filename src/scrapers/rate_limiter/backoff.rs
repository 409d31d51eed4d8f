//! Pure backoff schedule helpers.

use std::time::Duration;

/// Longest wait honoured from a Retry-After header.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Exponential backoff delay for a given attempt: `base * 2^attempt`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let base = Duration::from_millis(1000);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_millis(8000));
        assert_eq!(backoff_delay(4, base, cap), cap);
        assert_eq!(backoff_delay(63, base, cap), cap);
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(60);
        let delays: Vec<_> = (0..40).map(|a| backoff_delay(a, base, cap)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), cap);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some(" 120 ")), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
