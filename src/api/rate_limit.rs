//! Per-IP rate limiting for the credential endpoints.
//!
//! Sliding-window token buckets keyed by (ip, tier). Login and
//! registration carry separate budgets so a burst of signups cannot lock
//! out logins for the same address.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::error::{ErrorBody, ErrorResponse};
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    Login,
    Register,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_request: Instant,
}

impl Bucket {
    fn new(max_tokens: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: max_tokens,
            window_start: now,
            last_request: now,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    /// Consume one token for `ip` in `tier`. The error carries the number
    /// of seconds until the caller may retry.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let max_tokens = self.max_tokens(tier);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((ip, tier))
            .or_insert_with(|| Bucket::new(max_tokens));

        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= self.window {
            bucket.tokens = max_tokens;
            bucket.window_start = now;
        } else {
            // Replenish gradually so the budget slides instead of resetting
            // all at once at the window edge
            let rate = max_tokens as f64 / self.window.as_secs_f64();
            let replenished =
                (now.duration_since(bucket.last_request).as_secs_f64() * rate) as u32;
            bucket.tokens = (bucket.tokens + replenished).min(max_tokens);
        }
        bucket.last_request = now;

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(elapsed).as_secs().max(1))
        }
    }

    fn max_tokens(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Login => self.config.login_requests_per_window,
            RateLimitTier::Register => self.config.register_requests_per_window,
        }
    }

    /// Drop buckets whose window started more than two windows ago.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.window_start) < expiry);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Client IP: first X-Forwarded-For entry, then X-Real-IP, then loopback.
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip_str) = value.split(',').next() {
                if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }
    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    IpAddr::from([127, 0, 0, 1])
}

pub async fn limit_login(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    limit_with_tier(state, request, next, RateLimitTier::Login).await
}

pub async fn limit_register(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    limit_with_tier(state, request, next, RateLimitTier::Register).await
}

async fn limit_with_tier(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&request);

    match state.rate_limiter.check(ip, tier) {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            tracing::warn!(ip = %ip, ?tier, "Rate limit exceeded");
            let body = Json(ErrorResponse {
                error: ErrorBody {
                    code: "rate_limited".to_string(),
                    message: format!(
                        "Too many attempts. Try again in {} seconds",
                        retry_after
                    ),
                },
            });
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                body,
            )
                .into_response())
        }
    }
}

/// Periodically drop idle buckets so the map does not grow unbounded.
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                buckets = rate_limiter.bucket_count(),
                "Rate limiter cleanup complete"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            login_requests_per_window: 5,
            register_requests_per_window: 2,
            window_seconds: 60,
            cleanup_interval_seconds: 300,
        }
    }

    #[test]
    fn test_allows_requests_under_the_limit() {
        let limiter = RateLimiter::new(test_config());
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for i in 0..5 {
            assert!(
                limiter.check(ip, RateLimitTier::Login).is_ok(),
                "request {} should be allowed",
                i
            );
        }
    }

    #[test]
    fn test_blocks_after_the_limit() {
        let limiter = RateLimiter::new(test_config());
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..5 {
            let _ = limiter.check(ip, RateLimitTier::Login);
        }
        assert!(limiter.check(ip, RateLimitTier::Login).is_err());
    }

    #[test]
    fn test_addresses_have_separate_budgets() {
        let limiter = RateLimiter::new(test_config());
        let first: IpAddr = "192.168.1.1".parse().unwrap();
        let second: IpAddr = "192.168.1.2".parse().unwrap();

        for _ in 0..5 {
            let _ = limiter.check(first, RateLimitTier::Login);
        }
        assert!(limiter.check(first, RateLimitTier::Login).is_err());
        assert!(limiter.check(second, RateLimitTier::Login).is_ok());
    }

    #[test]
    fn test_tiers_have_separate_budgets() {
        let limiter = RateLimiter::new(test_config());
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..2 {
            let _ = limiter.check(ip, RateLimitTier::Register);
        }
        assert!(limiter.check(ip, RateLimitTier::Register).is_err());
        assert!(limiter.check(ip, RateLimitTier::Login).is_ok());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = test_config();
        config.enabled = false;
        let limiter = RateLimiter::new(config);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..100 {
            assert!(limiter.check(ip, RateLimitTier::Login).is_ok());
        }
    }

    #[test]
    fn test_cleanup_keeps_recent_buckets() {
        let limiter = RateLimiter::new(test_config());
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        let _ = limiter.check(ip, RateLimitTier::Login);
        assert_eq!(limiter.bucket_count(), 1);
        limiter.cleanup_expired();
        assert_eq!(limiter.bucket_count(), 1);
    }
}
