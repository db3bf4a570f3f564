//! Per-client token-bucket rate limiting with idle eviction.
//!
//! The registry lives inside [`RateLimiter`], created once at startup and
//! shared through an `Arc`. Entries are only removed by the limiter's own sweep
//! task, which is started once and stops on the shutdown broadcast.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::gatekeeper::GateError;
use crate::observability::metrics;

/// Network identity a bucket is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey(IpAddr);

impl ClientKey {
    /// Parse `ip` or `ip:port` (IPv6 may be bracketed).
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let raw = raw.trim();
        if let Ok(addr) = raw.parse::<SocketAddr>() {
            return Ok(Self(addr.ip()));
        }
        raw.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(Self)
            .map_err(|_| GateError::BadClientIdentity(raw.to_string()))
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.ip())
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Rate and eviction policy shared by every bucket.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst: f64,
    pub sweep_interval: Duration,
    pub idle_retention: Duration,
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            requests_per_second: config.requests_per_second,
            burst: config.burst_size as f64,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            idle_retention: Duration::from_secs(config.idle_retention_secs),
        }
    }
}

/// A simple token bucket with lazy refill.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens; the min also clamps buckets after a policy shrink.
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientRecord {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Registry of client buckets.
pub struct RateLimiter {
    clients: DashMap<ClientKey, ClientRecord>,
    policy: ArcSwap<RateLimitPolicy>,
    sweeper_started: AtomicBool,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            clients: DashMap::new(),
            policy: ArcSwap::from_pointee(policy),
            sweeper_started: AtomicBool::new(false),
        }
    }

    /// Consume one token for `key`, returning whether the request is admitted.
    pub fn allow(&self, key: &ClientKey) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &ClientKey, now: Instant) -> bool {
        let policy = self.policy.load();
        if !policy.enabled {
            return true;
        }

        // The entry guard holds the shard lock: insert-if-absent and the bucket
        // update are one critical section per key.
        let mut record = self.clients.entry(*key).or_insert_with(|| ClientRecord {
            bucket: TokenBucket::new(policy.burst, now),
            last_seen: now,
        });
        record.last_seen = now;
        record.bucket.try_acquire(now, policy.burst, policy.requests_per_second)
    }

    /// Drop clients idle longer than the retention window. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let retention = self.policy.load().idle_retention;
        let mut removed = 0;
        self.clients.retain(|_, record| {
            let keep = now.saturating_duration_since(record.last_seen) <= retention;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        self.policy.load_full()
    }

    /// Replace the policy. Existing buckets adopt it at their next check.
    pub fn update_policy(&self, policy: RateLimitPolicy) {
        tracing::info!(
            rps = policy.requests_per_second,
            burst = policy.burst,
            enabled = policy.enabled,
            "Rate limit policy updated"
        );
        self.policy.store(Arc::new(policy));
    }

    /// Spawn the periodic sweep. Returns `None` if it is already running.
    pub fn start_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if self.sweeper_started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Rate limiter sweeper already running");
            return None;
        }

        let limiter = Arc::clone(self);
        let interval = limiter.policy.load().sweep_interval;

        Some(tokio::spawn(async move {
            tracing::info!(interval = ?interval, "Rate limiter sweeper starting");
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        let remaining = limiter.tracked_clients();
                        metrics::record_tracked_clients(remaining);
                        if removed > 0 {
                            tracing::debug!(removed, remaining, "Evicted idle clients");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate limiter sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }))
    }
}
