use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide limiter for the mutating API surface. Webhooks and cron
/// triggers are not routed through it.
pub struct ApiRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, governor::clock::DefaultClock>,
}

impl ApiRateLimiter {
    pub fn new(requests: u32, per_seconds: u64) -> Self {
        let quota = Quota::with_period(Duration::from_secs(per_seconds))
            .unwrap_or_else(|| Quota::per_minute(NonZeroU32::new(60).unwrap()))
            .allow_burst(NonZeroU32::new(requests.max(1)).unwrap());

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ApiRateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    if !limiter.check() {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        )
            .into_response());
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_burst_then_rejects() {
        let limiter = ApiRateLimiter::new(3, 60);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
