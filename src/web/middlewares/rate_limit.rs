use std::{net::SocketAddr, num::NonZeroU32, time::Duration};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    DefaultKeyedRateLimiter, Quota,
    clock::{Clock, DefaultClock},
};

use crate::{
    config::RateLimit,
    web::{AppState, WebError},
};

/// Requests without any client address share this bucket.
const SHARED_KEY: &str = "unknown";
const RETAIN_THRESHOLD: usize = 10_000;

/// Per-client request budget: `max_requests` per `window_secs`, refilled
/// gradually over the window.
pub struct RateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked_clients", &self.limiter.len())
            .finish()
    }
}

fn quota(window_secs: u64, max_requests: u32) -> Quota {
    let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_secs(window_secs);

    Quota::with_period(window / burst.get())
        .map(|q| q.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst))
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            limiter: governor::RateLimiter::keyed(quota(window_secs, max_requests)),
            clock: DefaultClock::default(),
        }
    }

    pub fn from_config(config: &RateLimit) -> Self {
        Self::new(config.window_secs(), config.max_requests())
    }

    /// Takes one request from `key`'s budget. On refusal returns the number of
    /// seconds until the next request would be accepted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }

        self.limiter
            .check_key(&key.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()).as_secs().max(1))
    }
}

/// Socket address first, then the first `X-Forwarded-For` hop.
fn client_key(connect_info: Option<&ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> String {
    if let Some(ConnectInfo(addr)) = connect_info {
        return addr.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .unwrap_or_else(|| String::from(SHARED_KEY))
}

pub async fn rate_limit_fn(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let key = client_key(
        req.extensions().get::<ConnectInfo<SocketAddr>>(),
        req.headers(),
    );

    if let Err(retry_after) = state.rate_limiter().check(&key) {
        tracing::warn!("rate limit exceeded for {}", key);
        return Err(WebError::rate_limited(retry_after));
    }

    Ok(next.run(req).await)
}
