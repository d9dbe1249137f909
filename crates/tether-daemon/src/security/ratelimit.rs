//! Fixed-window rate limiting keyed by client network address
//!
//! Windows reset lazily on the first check after expiry; there is no
//! background timer. Keys are fully independent.

use dashmap::DashMap;

use tether_core::RateLimitError;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: u64,
    count: u32,
}

/// Fixed-window request counter
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    /// Window length in millis
    window_ms: u64,
    /// Requests allowed per window
    max_requests: u32,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window_ms`
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window_ms,
            max_requests,
        }
    }

    /// Count one request against `key`. Over-limit requests get the time
    /// until the current window rolls over.
    pub fn check_at(&self, key: &str, now: u64) -> Result<(), RateLimitError> {
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if now.saturating_sub(window.started_at) >= self.window_ms {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let retry_after_ms = (window.started_at + self.window_ms).saturating_sub(now);
            return Err(RateLimitError::Exceeded {
                key: key.to_string(),
                retry_after_ms,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Drop windows that have rolled over
    pub fn cleanup_at(&self, now: u64) {
        self.windows
            .retain(|_, w| now.saturating_sub(w.started_at) < self.window_ms);
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(60_000, 3);
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", 0).is_ok());
        }
        assert!(limiter.check_at("10.0.0.1", 1).is_err());
    }

    #[test]
    fn test_retry_after_points_at_window_end() {
        let limiter = RateLimiter::new(60_000, 1);
        limiter.check_at("k", 0).unwrap();

        let err = limiter.check_at("k", 15_000).unwrap_err();
        assert_eq!(
            err,
            RateLimitError::Exceeded {
                key: "k".to_string(),
                retry_after_ms: 45_000,
            }
        );
    }

    #[test]
    fn test_window_resets_lazily() {
        let limiter = RateLimiter::new(60_000, 1);
        limiter.check_at("k", 0).unwrap();
        assert!(limiter.check_at("k", 59_999).is_err());
        assert!(limiter.check_at("k", 60_000).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(60_000, 1);
        limiter.check_at("a", 0).unwrap();
        assert!(limiter.check_at("a", 1).is_err());
        assert!(limiter.check_at("b", 1).is_ok());
    }

    #[test]
    fn test_cleanup_drops_stale_windows() {
        let limiter = RateLimiter::new(60_000, 5);
        limiter.check_at("old", 0).unwrap();
        limiter.check_at("new", 60_000).unwrap();

        limiter.cleanup_at(60_001);
        assert_eq!(limiter.len(), 1);
    }
}
