//! Fixed-window rate limiting: buckets keyed by IP
//! (global) and by user id (installed after auth resolves it, falling back to
//! IP). Coarse sharded map, lazily expired on access, never leaking a pointer
//! into a bucket — callers only ever get back `(allowed, retry_after)`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use xcore::error::{AppError, ErrorCode};
use xcore::identity::AuthContext;

struct Bucket {
    count: u32,
    reset_at: Instant,
}

pub struct FixedWindowLimiter {
    capacity: u32,
    window: Duration,
    buckets: DashMap<String, Bucket>,
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after: Duration,
}

impl FixedWindowLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window, buckets: DashMap::new() }
    }

    /// Checks and increments the bucket for `key` in one step.
    pub fn check_and_increment(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
                count: 0,
                reset_at: now + self.window,
        });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }
        if entry.count >= self.capacity {
            let retry_after = entry.reset_at.saturating_duration_since(now);
            return RateLimitDecision { allowed: false, retry_after };
        }
        entry.count += 1;
        RateLimitDecision { allowed: true, retry_after: Duration::ZERO }
    }

    /// Drops buckets whose window has already elapsed. Not required for
    /// correctness (buckets self-reset lazily) but keeps the map from growing
    /// unbounded under many distinct keys (e.g. IPv6 churn).
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| now < bucket.reset_at);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

pub struct RateLimitState {
    pub ip_limiter: FixedWindowLimiter,
    pub user_limiter: FixedWindowLimiter,
}

impl RateLimitState {
    pub fn new(ip_limit: u32, user_limit: u32, window: Duration) -> Self {
        Self { ip_limiter: FixedWindowLimiter::new(ip_limit, window), user_limiter: FixedWindowLimiter::new(user_limit, window) }
    }
}

fn too_many_requests(retry_after: Duration) -> AppError {
    AppError::with_message(ErrorCode::RateLimited, ErrorCode::RateLimited.default_message())
    .with_retry_after(retry_after)
}

/// Global, keyed by client IP. Runs before authentication resolves a user.
pub async fn ip_rate_limit_middleware(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip: IpAddr = req
    .extensions()
    .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    .map(|a| a.0.ip())
    .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    let decision = state.ip_limiter.check_and_increment(&ip.to_string());
    if !decision.allowed {
        return Err(too_many_requests(decision.retry_after));
    }
    Ok(next.run(req).await)
}

/// Per-user, falling back to IP when unauthenticated. Must be installed
/// after [`crate::auth::auth_middleware`].
pub async fn user_rate_limit_middleware(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = match req.extensions().get::<AuthContext>() {
        Some(ctx) => format!("user:{}", ctx.user_id),
        None => {
            let ip: IpAddr = req
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|a| a.0.ip())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
            format!("ip:{ip}")
        }
    };
    let decision = state.user_limiter.check_and_increment(&key);
    if !decision.allowed {
        return Err(too_many_requests(decision.retry_after));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_at_most_capacity_within_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(1));
        assert!(limiter.check_and_increment("ip1").allowed);
        assert!(limiter.check_and_increment("ip1").allowed);
        let third = limiter.check_and_increment("ip1");
        assert!(!third.allowed);
        assert!(third.retry_after <= Duration::from_secs(1));
    }

    #[test]
    fn different_keys_have_independent_buckets() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.check_and_increment("a").allowed);
        assert!(limiter.check_and_increment("b").allowed);
    }

    #[test]
    fn window_resets_after_elapsed() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check_and_increment("a").allowed);
        assert!(!limiter.check_and_increment("a").allowed);
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check_and_increment("a").allowed);
    }

    #[test]
    fn sweep_drops_expired_buckets_only() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(10));
        limiter.check_and_increment("a");
        std::thread::sleep(Duration::from_millis(20));
        limiter.sweep_expired();
        assert!(limiter.is_empty());
    }
}
