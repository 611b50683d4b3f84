//! Per-IP fixed-window request limiter for the HTTP API.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Windows are swept for expiry once this many IPs are tracked.
const SWEEP_THRESHOLD: usize = 4096;

/// Request quota per client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { max_requests: 200, window: Duration::from_secs(60) }
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Shared limiter state. Clones count against the same windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: RateLimit,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `limit`.
    pub fn new(limit: RateLimit) -> Self {
        Self { limit, windows: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Count one request from `ip` at `now`.
    ///
    /// Returns `false` when `ip` has used up its quota for the current window.
    pub fn check(&self, ip: IpAddr, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < self.limit.window);
        }

        let window = windows.entry(ip).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= self.limit.window {
            *window = Window { started: now, count: 0 };
        }

        if window.count >= self.limit.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimit { max_requests, window: Duration::from_secs(60) })
    }

    #[test]
    fn quota_is_per_ip() {
        let limiter = limiter(2);
        let now = Instant::now();

        assert!(limiter.check(A, now));
        assert!(limiter.check(A, now));
        assert!(!limiter.check(A, now));
        assert!(limiter.check(B, now));
    }

    #[test]
    fn quota_resets_when_window_ends() {
        let limiter = limiter(1);
        let start = Instant::now();

        assert!(limiter.check(A, start));
        assert!(!limiter.check(A, start + Duration::from_secs(59)));
        assert!(limiter.check(A, start + Duration::from_secs(60)));
    }

    #[test]
    fn clones_share_windows() {
        let limiter = limiter(1);
        let other = limiter.clone();
        let now = Instant::now();

        assert!(limiter.check(A, now));
        assert!(!other.check(A, now));
    }

    #[test]
    fn default_matches_two_hundred_per_minute() {
        let limit = RateLimit::default();
        assert_eq!(limit.max_requests, 200);
        assert_eq!(limit.window, Duration::from_secs(60));
    }
}
