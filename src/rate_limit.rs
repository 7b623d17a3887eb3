//! Process-local rate limiting.
//!
//! Counters live behind the `RateLimiter` trait so a shared store can be
//! swapped in for multi-instance deployments; the default is an in-process
//! fixed-window counter. Drift across instances is acceptable: this is abuse
//! damping, not a correctness guarantee. Callers must check the limit before
//! any side-effecting work.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub trait RateLimiter: Send + Sync {
    /// Returns true if the call is allowed. With `limit = N`, the first N
    /// calls in a window succeed and the (N+1)th is rejected.
    fn check(&self, key: &str, limit: u32, window: Duration) -> bool;
}

#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: DashMap<String, WindowState>,
}

struct WindowState {
    started_at: Instant,
    window: Duration,
    count: u32,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, key: &str, limit: u32, window: Duration) -> bool {
        let now = Instant::now();
        // Lazy eviction: a fully elapsed window carries no state worth
        // keeping, so drop it rather than let the map grow with every key
        // ever seen. One entry per active (kind, user) pair remains.
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < w.window);

        let mut entry = self.windows.entry(key.to_string()).or_insert(WindowState {
            started_at: now,
            window,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= entry.window {
            entry.started_at = now;
            entry.window = window;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count <= limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_n_then_rejects() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        for _ in 0..5 {
            assert!(limiter.check("write:user-1", 5, window));
        }
        assert!(!limiter.check("write:user-1", 5, window));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        assert!(limiter.check("write:user-1", 1, window));
        assert!(!limiter.check("write:user-1", 1, window));
        assert!(limiter.check("write:user-2", 1, window));
    }

    #[test]
    fn expired_windows_are_evicted() {
        let limiter = InMemoryRateLimiter::new();
        let short = Duration::from_millis(5);
        limiter.check("decrypt:user-1", 1, short);
        limiter.check("decrypt:user-2", 1, short);
        assert_eq!(limiter.windows.len(), 2);

        std::thread::sleep(Duration::from_millis(10));
        limiter.check("write:user-3", 1, Duration::from_secs(60));
        assert_eq!(limiter.windows.len(), 1);
    }

    #[test]
    fn window_resets() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_millis(10);
        assert!(limiter.check("decrypt:user-1", 1, window));
        assert!(!limiter.check("decrypt:user-1", 1, window));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("decrypt:user-1", 1, window));
    }
}
