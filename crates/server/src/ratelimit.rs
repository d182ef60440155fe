//! Rate limiting middleware using the token bucket algorithm.
//!
//! Two per-IP limiters are kept:
//! - a general limiter applied to every request
//! - a stricter limiter applied only to the login route, to slow down
//!   password guessing
//!
//! Each limiter admits at most `max_entries` distinct client IPs. A periodic
//! cleanup forgets clients idle for `entry_ttl_secs` and lets governor drop
//! buckets that have refilled completely.
//!
//! Forwarded headers (`X-Forwarded-For`, `X-Real-IP`) are honoured only when
//! the direct peer matches `trusted_proxies`. An empty list trusts nobody and
//! `["*"]` trusts every peer.

use crate::metrics::RATE_LIMIT_REJECTIONS;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use certfolio_core::config::RateLimitConfig;
use dashmap::{DashMap, mapref::entry::Entry};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
};
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

struct RateLimitStateInner {
    general: ClientBuckets,
    login: ClientBuckets,
    trusted_proxies: TrustedProxies,
    max_entries: usize,
    entry_ttl: Duration,
    connect_info_warned: AtomicBool,
}

/// Governor buckets keyed by client IP, with a bounded client table.
struct ClientBuckets {
    name: &'static str,
    limiter: KeyedLimiter,
    seen: DashMap<String, Instant>,
    full_warned: AtomicBool,
}

impl ClientBuckets {
    fn new(name: &'static str, quota: Quota) -> Self {
        Self {
            name,
            limiter: RateLimiter::dashmap(quota),
            seen: DashMap::new(),
            full_warned: AtomicBool::new(false),
        }
    }

    fn check(&self, ip: &str, max_entries: usize) -> Result<(), RateLimitError> {
        // len() before entry(): DashMap deadlocks if a shard is already locked.
        let tracked = self.seen.len();
        match self.seen.entry(ip.to_string()) {
            Entry::Occupied(mut seen) => {
                seen.insert(Instant::now());
            }
            Entry::Vacant(_) if tracked >= max_entries => {
                if !self.full_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        limiter = self.name,
                        tracked,
                        "Rate limiter is full; new clients are rejected until cleanup"
                    );
                }
                return Err(RateLimitError {
                    retry_after_secs: 60,
                    reason: RateLimitReason::AtCapacity,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }

        self.limiter.check_key(&ip.to_string()).map_err(|not_until| {
            let now = governor::clock::Clock::now(&DefaultClock::default());
            let wait = not_until.wait_time_from(now);
            RateLimitError {
                retry_after_secs: wait.as_secs() + 1,
                reason: RateLimitReason::RateLimited,
            }
        })
    }

    /// Forget clients idle longer than `ttl`; returns how many were dropped.
    fn forget_idle(&self, ttl: Duration) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, last_seen| last_seen.elapsed() <= ttl);
        let forgotten = before.saturating_sub(self.seen.len());

        // Buckets that refilled are equivalent to fresh ones.
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        if forgotten > 0 {
            self.full_warned.store(false, Ordering::Relaxed);
            tracing::debug!(
                limiter = self.name,
                forgotten,
                remaining = self.seen.len(),
                "Forgot idle rate limit clients"
            );
        }
        forgotten
    }
}

/// Peers whose forwarded headers are believed.
#[derive(Clone, Debug)]
enum TrustedProxies {
    Nobody,
    Everyone,
    Networks(Vec<IpNet>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        match proxies {
            [] => Self::Nobody,
            [only] if only == "*" => Self::Everyone,
            _ => Self::Networks(
                proxies
                    .iter()
                    .filter_map(|entry| match parse_network(entry) {
                        Some(net) => Some(net),
                        None => {
                            tracing::warn!(entry = %entry, "Ignoring invalid trusted proxy");
                            None
                        }
                    })
                    .collect(),
            ),
        }
    }

    fn is_trusted(&self, peer: &str) -> bool {
        match self {
            Self::Nobody => false,
            Self::Everyone => true,
            Self::Networks(networks) => peer
                .parse::<IpAddr>()
                .is_ok_and(|ip| networks.iter().any(|net| net.contains(&ip))),
        }
    }
}

/// A CIDR range, or a bare address as a single-host network.
fn parse_network(entry: &str) -> Option<IpNet> {
    let entry = entry.trim();
    entry
        .parse::<IpNet>()
        .ok()
        .or_else(|| entry.parse::<IpAddr>().ok().map(IpNet::from))
}

fn per_minute(requests: u32, burst: u32) -> Quota {
    let rate = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(rate).allow_burst(burst)
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        // The login burst never exceeds the login rate itself.
        let login_burst = config
            .burst_size
            .min(config.login_requests_per_minute);

        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                general: ClientBuckets::new(
                    "ip",
                    per_minute(config.ip_requests_per_minute, config.burst_size),
                ),
                login: ClientBuckets::new(
                    "login",
                    per_minute(config.login_requests_per_minute, login_burst),
                ),
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                max_entries: config.max_entries as usize,
                entry_ttl: Duration::from_secs(config.entry_ttl_secs),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Check the general per-IP limit.
    pub fn check_ip(&self, ip: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.general.check(ip, inner.max_entries),
            None => Ok(()),
        }
    }

    /// Check the per-IP login limit.
    pub fn check_login(&self, ip: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.login.check(ip, inner.max_entries),
            None => Ok(()),
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Forget idle clients in both limiters. Returns the number forgotten.
    pub fn cleanup(&self) -> usize {
        match &self.inner {
            Some(inner) => {
                let ttl = inner.entry_ttl;
                inner.general.forget_idle(ttl) + inner.login.forget_idle(ttl)
            }
            None => 0,
        }
    }

    /// Current number of tracked (general, login) entries.
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(inner) => (inner.general.seen.len(), inner.login.seen.len()),
            None => (0, 0),
        }
    }

    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All requests will share the \
                 'unknown' bucket. Serve the router with \
                 into_make_service_with_connect_info::<SocketAddr>()."
            );
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// The client's bucket is empty.
    RateLimited,
    /// The client table is full and this client is new.
    AtCapacity,
}

/// A 429 rejection with its retry hint.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after_secs: u64,
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs;
        let (code, message) = match self.reason {
            RateLimitReason::RateLimited => (
                "rate_limited",
                format!("Too many requests; retry in {retry_after} seconds"),
            ),
            RateLimitReason::AtCapacity => (
                "rate_limiter_full",
                format!("Too many distinct clients; retry in {retry_after} seconds"),
            ),
        };

        (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_after.to_string())],
            axum::Json(serde_json::json!({
                "code": code,
                "message": message,
                "retry_after": retry_after,
            })),
        )
            .into_response()
    }
}

/// Key shared by requests whose peer address is unavailable.
const UNKNOWN_CLIENT: &str = "unknown";

/// First client named by `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    ["x-forwarded-for", "x-real-ip"].into_iter().find_map(|name| {
        let value = headers.get(name)?.to_str().ok()?;
        let client = value.split(',').next()?.trim();
        (!client.is_empty()).then(|| client.to_string())
    })
}

/// Address a request is keyed by.
fn client_ip(req: &Request<Body>, state: &RateLimitState) -> String {
    let Some(inner) = &state.inner else {
        return UNKNOWN_CLIENT.to_string();
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let trust_forwarded = match &peer {
        Some(peer) => inner.trusted_proxies.is_trusted(peer),
        // A network list cannot be checked without the peer.
        None => matches!(inner.trusted_proxies, TrustedProxies::Everyone),
    };

    if trust_forwarded && let Some(client) = forwarded_client(req.headers()) {
        return client;
    }

    peer.unwrap_or_else(|| {
        state.warn_connect_info_missing();
        UNKNOWN_CLIENT.to_string()
    })
}

fn reject(limiter: &'static str, err: RateLimitError) -> Response {
    RATE_LIMIT_REJECTIONS.with_label_values(&[limiter]).inc();
    err.into_response()
}

/// Per-IP rate limiting for every request.
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if rate_limit.is_enabled() {
        let ip = client_ip(&req, &rate_limit);
        if let Err(e) = rate_limit.check_ip(&ip) {
            return reject("ip", e);
        }
    }
    next.run(req).await
}

/// Stricter per-IP rate limiting for the login route.
pub async fn login_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if rate_limit.is_enabled() {
        let ip = client_ip(&req, &rate_limit);
        if let Err(e) = rate_limit.check_login(&ip) {
            tracing::warn!(client_ip = %ip, "Login rate limit exceeded");
            return reject("login", e);
        }
    }
    next.run(req).await
}

/// Spawn a background task that periodically evicts stale limiter entries.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let forgotten = state.cleanup();
            if forgotten > 0 {
                tracing::info!(forgotten, "Rate limiter cleanup finished");
            }
        }
    })
}
