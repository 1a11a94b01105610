//! Global rate limiting and request timeout middleware.

use crate::AppState;
use crate::config::ResilienceConfig;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::time::Duration;

/// Build the process-wide limiter from configuration.
///
/// Zero values fall back to one request per second with a burst of one.
#[must_use]
pub fn build_rate_limiter(config: &ResilienceConfig) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(nonzero!(1u32));
    RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.resilience.rate_limit_enabled && state.rate_limiter.check().is_err() {
        tracing::warn!(path = %req.uri().path(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(req).await)
}

/// Effective whole-request timeout.
///
/// A disabled timeout becomes a very large one so the middleware stack keeps
/// a single type.
#[must_use]
pub fn request_timeout(config: &ResilienceConfig) -> Duration {
    if config.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60) // 1 year
    } else {
        Duration::from_secs(config.request_timeout_secs)
    }
}

/// Run the rest of the stack under `duration`, answering 408 when it elapses.
pub async fn timeout_middleware(duration: Duration, req: Request, next: Next) -> Response {
    match tokio::time::timeout(duration, next.run(req)).await {
        Ok(res) => res,
        Err(_elapsed) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resilience(rps: u32, burst: u32) -> ResilienceConfig {
        ResilienceConfig {
            rate_limit_enabled: true,
            requests_per_second: rps,
            burst_size: burst,
            timeout_disabled: false,
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = build_rate_limiter(&resilience(1, 3));

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());

        // Burst exhausted
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_zero_burst_falls_back_to_one() {
        let limiter = build_rate_limiter(&resilience(1, 0));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_request_timeout_respects_disable_flag() {
        let mut cfg = resilience(5, 10);
        assert_eq!(request_timeout(&cfg), Duration::from_secs(30));

        cfg.timeout_disabled = true;
        assert!(request_timeout(&cfg) > Duration::from_secs(24 * 60 * 60));
    }
}
