//! Shared helpers for provider adapters and registry clients.

use std::time::Duration;

use quill_domain::error::Error;

/// Map a reqwest error into the domain error, preserving timeout-ness.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Http(format!("request timed out: {e}"))
    } else {
        Error::Http(e.to_string())
    }
}

/// Lower and upper bounds for honouring a `Retry-After` hint.
pub const RETRY_AFTER_MIN: Duration = Duration::from_secs(10);
pub const RETRY_AFTER_MAX: Duration = Duration::from_secs(120);

/// Parse a `Retry-After` header (seconds form) and clamp it into
/// `[10s, 120s]`. Absent or unparseable hints fall back to the minimum.
pub fn retry_after_wait(headers: &reqwest::header::HeaderMap) -> Duration {
    let hinted = headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(RETRY_AFTER_MIN);
    hinted.clamp(RETRY_AFTER_MIN, RETRY_AFTER_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    fn headers_with(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn hint_within_bounds_is_honoured() {
        assert_eq!(
            retry_after_wait(&headers_with("45")),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn hint_below_minimum_is_raised() {
        assert_eq!(
            retry_after_wait(&headers_with("2")),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn hint_above_maximum_is_clamped() {
        assert_eq!(
            retry_after_wait(&headers_with("3600")),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn missing_hint_falls_back_to_minimum() {
        assert_eq!(retry_after_wait(&HeaderMap::new()), Duration::from_secs(10));
    }

    #[test]
    fn garbage_hint_falls_back_to_minimum() {
        assert_eq!(
            retry_after_wait(&headers_with("soon")),
            Duration::from_secs(10)
        );
    }
}
