//! Per-client rate limiting.
//!
//! Each client IP gets its own governor limiter holding
//! `rate_limit_per_window` requests per `rate_limit_window`, replenished
//! evenly across the window. Over the limit the client gets 429 with a
//! `Retry-After` header.
//!
//! A limiter left alone long enough to refill completely is no different
//! from a fresh one, so such limiters are dropped; the middleware sweeps
//! for them at most once per refill period.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

struct ClientLimiter {
    limiter: DirectRateLimiter,
    /// Milliseconds since the state's epoch at the last request.
    last_seen_ms: AtomicU64,
}

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    /// Per-IP limiters
    limiters: Arc<DashMap<IpAddr, Arc<ClientLimiter>>>,
    epoch: Instant,
    last_prune_ms: Arc<AtomicU64>,
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("enabled", &self.config.rate_limit_enabled)
            .field("clients", &self.limiters.len())
            .finish()
    }
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: Arc::new(DashMap::new()),
            epoch: Instant::now(),
            last_prune_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn quota(&self) -> Quota {
        let per_window = self.config.rate_limit_per_window.max(1);
        let period = self
            .config
            .rate_limit_window
            .checked_div(per_window)
            .filter(|p| !p.is_zero())
            .unwrap_or(Duration::from_millis(1));
        let burst = NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }

    /// Time for an exhausted limiter to refill its whole burst.
    fn refill_period(&self) -> Duration {
        let quota = self.quota();
        quota.replenish_interval() * quota.burst_size().get()
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<ClientLimiter> {
        let now = self.elapsed_ms();
        let client = self
            .limiters
            .entry(ip)
            .or_insert_with(|| {
                Arc::new(ClientLimiter {
                    limiter: RateLimiter::direct(self.quota()),
                    last_seen_ms: AtomicU64::new(now),
                })
            })
            .clone();
        client.last_seen_ms.store(now, Ordering::Relaxed);
        client
    }

    /// Drop every limiter that has been idle for a full refill period.
    /// Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let now = self.elapsed_ms();
        let idle_ms = u64::try_from(self.refill_period().as_millis()).unwrap_or(u64::MAX);
        let before = self.limiters.len();
        self.limiters.retain(|_, client| {
            now.saturating_sub(client.last_seen_ms.load(Ordering::Relaxed)) < idle_ms
        });
        self.last_prune_ms.store(now, Ordering::Relaxed);
        before.saturating_sub(self.limiters.len())
    }

    /// Prune when the last sweep is at least one refill period old.
    fn maybe_prune(&self) {
        let now = self.elapsed_ms();
        let idle_ms = u64::try_from(self.refill_period().as_millis()).unwrap_or(u64::MAX);
        let last = self.last_prune_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < idle_ms {
            return;
        }
        // One request wins the sweep; the rest carry on.
        if self
            .last_prune_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let dropped = self.prune_idle();
            if dropped > 0 {
                tracing::debug!(
                    dropped,
                    remaining = self.limiters.len(),
                    "Pruned idle rate limiters"
                );
            }
        }
    }

    /// Number of clients with a live limiter.
    pub fn client_count(&self) -> usize {
        self.limiters.len()
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the next request is allowed
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let status = error.status_code();

        let mut response = (status, Json(error)).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Client IP from proxy headers, then the socket, then the unspecified
/// address when neither is available (in-process tests).
fn extract_client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        // X-Forwarded-For can contain multiple IPs, take the first one
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    state.maybe_prune();
    let ip = extract_client_ip(&request);
    let client = state.limiter_for(ip);

    match client.limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from_str(&state.config.rate_limit_per_window.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("100")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::warn!(client_ip = %ip, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}
