//! Request middleware: per-IP rate limiting.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

/// Length of one rate-limit window.
const WINDOW: Duration = Duration::from_secs(60);

/// In-memory rate limiter keyed by client IP.
///
/// Uses a simple fixed window counter.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the request is allowed.
    ///
    /// Returns `true` if allowed, `false` if limit exceeded.
    pub fn check(&self, ip: IpAddr, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // The map holds plain counters and stays usable after a
                // panicked holder; at worst one window is counted stale.
                tracing::error!("rate limiter lock poisoned, continuing with recovered state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Bounded memory: once the map grows large, evict only entries
        // whose window has expired. Active limits survive the cleanup.
        if state.len() > 10_000 {
            state.retain(|_, (_, start)| now.duration_since(*start) <= WINDOW);
        }

        let (count, start) = state.entry(ip).or_insert((0, now));

        if now.duration_since(*start) > WINDOW {
            // Reset window
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiting middleware.
///
/// Orchestration, verb relays, and registration run under tighter limits
/// than reads; all limits come from the server configuration.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    // ConnectInfo is only present when the server is built with
    // `into_make_service_with_connect_info`; without it there is no
    // client key to count against.
    let ip = if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip()
    } else {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let limits = &state.rate_limits;
    let path = req.uri().path();
    let limit = if path == "/api/orchestrator/orchestrate" || path.starts_with("/orchestrate/") {
        limits.orchestrate_limit
    } else if path == "/api/registry/agents" && req.method() == Method::POST {
        limits.register_limit
    } else {
        limits.default_limit
    };

    if !state.rate_limiter.check(ip, limit) {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Rate limit exceeded, retry later"})),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
        return Ok(response);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip, 5));
        }
        // 6th request should be denied
        assert!(!limiter.check(ip, 5));
    }

    #[test]
    fn rate_limiter_keys_clients_independently() {
        let limiter = RateLimiter::new();
        let client_a: IpAddr = "10.0.0.1".parse().unwrap();
        let client_b: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(client_a, 3));
        }
        assert!(!limiter.check(client_a, 3));

        // client_b has its own window
        assert!(limiter.check(client_b, 3));
    }

    #[test]
    fn rate_limiter_eviction_preserves_active_limits() {
        let limiter = RateLimiter::new();

        // Fill with enough distinct IPs to trigger the eviction pass.
        for i in 0..10_001u32 {
            let ip: IpAddr = std::net::Ipv4Addr::from(i.to_be_bytes()).into();
            limiter.check(ip, 100);
        }

        // The most recent entry is inside its window, so its counter must
        // have survived: one call was spent above, 99 remain.
        let recent: IpAddr = std::net::Ipv4Addr::from(10_000u32.to_be_bytes()).into();
        for _ in 0..99 {
            assert!(limiter.check(recent, 100));
        }
        assert!(!limiter.check(recent, 100));
    }
}
