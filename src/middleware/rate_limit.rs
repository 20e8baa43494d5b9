//! Rate limiting middleware.
//!
//! Simple in-memory rate limiting per IP address using a fixed window.
//! The auth endpoints run a strict credential-stuffing cap (5 per 15
//! minutes); general API traffic a looser one. Both are only installed in
//! production.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if a request from this IP should be allowed.
    fn check(&self, ip: IpAddr) -> RateLimitResult {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > self.config.max_requests {
            let reset_at = entry.window_start + self.config.window;
            RateLimitResult::Exceeded {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            RateLimitResult::Allowed
        }
    }

    /// Drop stale entries.
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }

    /// Sweep stale entries once per window so the per-IP map stays bounded.
    pub fn spawn_cleanup(&self) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(limiter.config.window);
            loop {
                tick.tick().await;
                limiter.cleanup();
            }
        });
    }
}

enum RateLimitResult {
    Allowed,
    Exceeded { retry_after: Duration },
}

/// Rate limiting middleware function.
///
/// `ConnectInfo` is optional so router-level tests (which have no socket)
/// still pass through; real serving installs it via
/// `into_make_service_with_connect_info`.
pub async fn rate_limit_middleware(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    axum::extract::State(limiter): axum::extract::State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    match limiter.check(ip) {
        RateLimitResult::Allowed => next.run(request).await,
        RateLimitResult::Exceeded { retry_after } => {
            warn!(
                ip = %ip,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "error": "Too many requests from this IP, please try again later.",
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(matches!(limiter.check(ip), RateLimitResult::Allowed));
        }
        assert!(matches!(
            limiter.check(ip),
            RateLimitResult::Exceeded { .. }
        ));
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(matches!(limiter.check(a), RateLimitResult::Allowed));
        assert!(matches!(limiter.check(a), RateLimitResult::Exceeded { .. }));
        assert!(matches!(limiter.check(b), RateLimitResult::Allowed));
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(10),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(matches!(limiter.check(ip), RateLimitResult::Allowed));
        assert!(matches!(limiter.check(ip), RateLimitResult::Exceeded { .. }));
        std::thread::sleep(Duration::from_millis(15));
        assert!(matches!(limiter.check(ip), RateLimitResult::Allowed));
    }

    #[test]
    fn test_cleanup_drops_stale_entries() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(5),
        });
        limiter.check("10.0.0.1".parse().unwrap());
        limiter.check("10.0.0.2".parse().unwrap());
        assert_eq!(limiter.state.lock().len(), 2);

        limiter.cleanup();
        assert_eq!(limiter.state.lock().len(), 2);

        std::thread::sleep(Duration::from_millis(15));
        limiter.cleanup();
        assert!(limiter.state.lock().is_empty());
    }
}
