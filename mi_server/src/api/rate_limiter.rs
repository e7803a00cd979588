//! Sliding-window throttle for verification code requests.
//!
//! Each identifier gets its own window so one caller cannot exhaust another's
//! allowance, and a single identifier cannot be flooded with codes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use mi_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Three codes per ten minutes
    /// let limiter = RateLimiter::new(3, Duration::from_secs(600));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// # Example
    ///
    /// ```
    /// # use mi_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
    /// assert!(limiter.check());
    /// assert!(limiter.check());
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> bool {
        self.evict(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Get the number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Time until the oldest request leaves the window
    pub fn reset_in(&self, now: Instant) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = now.saturating_duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.saturating_duration_since(*ts) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&mut self, now: Instant) -> bool {
        self.evict(now);
        self.timestamps.is_empty()
    }
}

/// One [`RateLimiter`] per key
#[derive(Debug)]
pub struct RequestThrottle {
    limiters: Mutex<HashMap<String, RateLimiter>>,
    max_requests: usize,
    window: Duration,
}

impl RequestThrottle {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Record a request for `key`.
    ///
    /// Returns `Err` with the time until the next request is allowed when the
    /// window is full.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut limiters = self.limiters.lock().await;
        let limiter = limiters
            .entry(key.to_string())
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check_at(now) {
            Ok(())
        } else {
            Err(limiter.reset_in(now).unwrap_or(self.window))
        }
    }

    /// Drop keys with no requests left in their window. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut limiters = self.limiters.lock().await;
        let before = limiters.len();
        limiters.retain(|_, limiter| !limiter.is_idle(now));
        before - limiters.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.limiters.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(600));
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(now));
        }

        assert!(!limiter.check_at(now), "Should block request over limit");
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_rate_limiter_window_slides() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(600));
        let start = Instant::now();

        assert!(limiter.check_at(start));
        assert!(limiter.check_at(start + Duration::from_secs(300)));
        assert!(!limiter.check_at(start + Duration::from_secs(599)));

        // First request leaves the window; the second is still inside it.
        assert!(limiter.check_at(start + Duration::from_secs(600)));
        assert!(!limiter.check_at(start + Duration::from_secs(601)));
    }

    #[test]
    fn test_reset_in() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(600));
        let start = Instant::now();

        assert!(limiter.reset_in(start).is_none());
        limiter.check_at(start);
        assert_eq!(
            limiter.reset_in(start + Duration::from_secs(100)),
            Some(Duration::from_secs(500))
        );
    }

    #[tokio::test]
    async fn test_throttle_keys_are_independent() {
        let throttle = RequestThrottle::new(1, Duration::from_secs(600));
        let now = Instant::now();

        assert!(throttle.check_at("a@example.com", now).await.is_ok());
        assert!(throttle.check_at("b@example.com", now).await.is_ok());

        let retry = throttle.check_at("a@example.com", now).await.unwrap_err();
        assert_eq!(retry, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_prune_drops_idle_keys() {
        let throttle = RequestThrottle::new(3, Duration::from_millis(10));
        throttle.check("a@example.com").await.unwrap();
        assert_eq!(throttle.tracked_keys().await, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(throttle.prune().await, 1);
        assert_eq!(throttle.tracked_keys().await, 0);
    }
}
