//! Per-client rate limiting with a sliding window.
//!
//! Credential endpoints (login, register, password recovery) get a tighter
//! budget than the rest of the API.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// General API endpoints
    Api,
    /// Login, registration and password recovery
    Auth,
}

/// Budget state for one (client, tier) pair
#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_request: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            window_start: now,
            last_request: now,
        }
    }
}

/// Outcome of an admitted request
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
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
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    pub fn capacity(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Take one token for `ip` in `tier`.
    ///
    /// Returns the remaining budget, or the number of seconds to wait.
    pub fn admit(&self, ip: IpAddr, tier: RateLimitTier) -> Result<Admission, u64> {
        if !self.config.enabled {
            return Ok(Admission {
                limit: u32::MAX,
                remaining: u32::MAX,
                reset_after: 0,
            });
        }

        let capacity = self.capacity(tier);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((ip, tier))
            .or_insert_with(|| Bucket::full(capacity, now));

        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= self.window {
            *bucket = Bucket::full(capacity, now);
        } else {
            // Refill in proportion to the time since the previous request
            let idle = now.duration_since(bucket.last_request).as_secs_f64();
            let refill = (idle * capacity as f64 / self.window.as_secs_f64()) as u32;
            bucket.tokens = bucket.tokens.saturating_add(refill).min(capacity);
        }
        bucket.last_request = now;

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(bucket.window_start))
            .as_secs();

        if bucket.tokens == 0 {
            return Err(reset_after.max(1));
        }

        bucket.tokens -= 1;
        Ok(Admission {
            limit: capacity,
            remaining: bucket.tokens,
            reset_after,
        })
    }

    /// Forget clients idle for two full windows
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let keep_for = self.window * 2;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_request) < keep_for);
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Client address. Proxy headers count only when `trust_proxy` is set;
/// otherwise the socket peer is the client.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> IpAddr {
    let peer_ip = peer.map(|addr| addr.ip());
    if !trust_proxy {
        return peer_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real_ip)
        .or(peer_ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    enforce(state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    enforce(state, request, next, RateLimitTier::Auth).await
}

async fn enforce(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Result<Response, Response> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(
        request.headers(),
        peer,
        state.config.rate_limit.trust_proxy_headers,
    );

    match state.rate_limiter.admit(ip, tier) {
        Ok(admission) => {
            let mut response = next.run(request).await;
            if state.config.rate_limit.enabled {
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", HeaderValue::from(admission.limit));
                headers.insert("X-RateLimit-Remaining", HeaderValue::from(admission.remaining));
                headers.insert("X-RateLimit-Reset", HeaderValue::from(admission.reset_after));
            }
            Ok(response)
        }
        Err(retry_after) => {
            tracing::warn!(client = %ip, tier = ?tier, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Too many requests. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
            headers.insert(
                "X-RateLimit-Limit",
                HeaderValue::from(state.rate_limiter.capacity(tier)),
            );
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            Err(response)
        }
    }
}

/// Periodically drop idle client buckets
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                entries = rate_limiter.entry_count(),
                "Rate limiter cleanup complete"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            api_requests_per_window: 10,
            auth_requests_per_window: 3,
            window_seconds: 60,
            cleanup_interval: 300,
            trust_proxy_headers: false,
        })
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_blocks_once_budget_is_spent() {
        let limiter = limiter();
        let client = ip("10.0.0.1");

        for i in 0..3 {
            let admission = limiter.admit(client, RateLimitTier::Auth).unwrap();
            assert_eq!(admission.remaining, 2 - i);
        }

        let retry_after = limiter.admit(client, RateLimitTier::Auth).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn test_clients_and_tiers_are_independent() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.admit(ip("10.0.0.1"), RateLimitTier::Auth).unwrap();
        }

        assert!(limiter.admit(ip("10.0.0.1"), RateLimitTier::Auth).is_err());
        assert!(limiter.admit(ip("10.0.0.2"), RateLimitTier::Auth).is_ok());
        assert!(limiter.admit(ip("10.0.0.1"), RateLimitTier::Api).is_ok());
        assert_eq!(limiter.entry_count(), 3);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let mut config = limiter().config;
        config.enabled = false;
        let limiter = RateLimiter::new(config);

        for _ in 0..100 {
            assert!(limiter.admit(ip("10.0.0.1"), RateLimitTier::Auth).is_ok());
        }
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_clients() {
        let limiter = limiter();
        limiter.admit(ip("10.0.0.1"), RateLimitTier::Api).unwrap();
        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 1);
    }

    #[test]
    fn test_client_ip_resolution_order_behind_proxy() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None, true), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(client_ip(&headers, Some(peer), true), ip("192.168.1.9"));

        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.4"));
        assert_eq!(client_ip(&headers, Some(peer), true), ip("172.16.0.4"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer), true), ip("203.0.113.7"));
    }

    #[test]
    fn test_proxy_headers_ignored_unless_trusted() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.4"));

        assert_eq!(client_ip(&headers, Some(peer), false), ip("192.168.1.9"));
        assert_eq!(client_ip(&headers, None, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_spoofed_forwarded_for_shares_one_bucket() {
        let limiter = limiter();
        let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();

        let mut refused = 0;
        for i in 0..6 {
            let mut headers = HeaderMap::new();
            let spoofed = format!("203.0.113.{}", i);
            headers.insert("x-forwarded-for", HeaderValue::from_str(&spoofed).unwrap());
            let client = client_ip(&headers, Some(peer), false);
            if limiter.admit(client, RateLimitTier::Auth).is_err() {
                refused += 1;
            }
        }
        assert_eq!(refused, 3);
        assert_eq!(limiter.entry_count(), 1);
    }
}
