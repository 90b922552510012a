use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use tracing::debug;

use super::super::HttpState;
use super::error::ApiError;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// Sliding-window limiter keyed by client and route.
///
/// Buckets with no request inside the window are swept at most once per
/// window, so the map only holds recently active clients.
#[derive(Debug, Clone)]
pub struct UploadRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
    epoch: Instant,
    next_sweep_ms: Arc<AtomicU64>,
}

impl UploadRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
            epoch: Instant::now(),
            next_sweep_ms: Arc::new(AtomicU64::new(window_millis(window))),
        }
    }

    pub fn allow(&self, key: &str, route: &str) -> (bool, u32) {
        let bucket_key = format!("{key}:{route}");
        let now = Instant::now();
        let window = self.window;

        self.sweep_if_due(now);

        let mut entry = self.buckets.entry(bucket_key).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            return (false, 0);
        }

        entry.push(now);
        (true, remaining.saturating_sub(1))
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Number of client/route buckets currently held.
    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn sweep_if_due(&self, now: Instant) {
        let elapsed_ms =
            u64::try_from(now.duration_since(self.epoch).as_millis()).unwrap_or(u64::MAX);
        let due = self.next_sweep_ms.load(Ordering::Relaxed);
        if elapsed_ms < due {
            return;
        }
        let next = elapsed_ms.saturating_add(window_millis(self.window));
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let window = self.window;
        self.buckets.retain(|_, hits| {
            hits.retain(|instant| now.duration_since(*instant) < window);
            !hits.is_empty()
        });
    }
}

fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1)
}

pub async fn upload_rate_limit(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_key(request.headers(), peer);

    let (allowed, remaining) = state.rate_limiter.allow(&client, &path);
    if !allowed {
        debug!(
            target = "introspector::http::rate_limit",
            client = %client,
            limit = state.rate_limiter.limit(),
            "upload rate limit exceeded"
        );
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    let mut response = next.run(request).await;
    if let Ok(value) = remaining.to_string().parse() {
        response
            .headers_mut()
            .insert("x-ratelimit-remaining", value);
    }
    response
}

/// First forwarded address when present, else the socket peer.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
