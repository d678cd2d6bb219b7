// crates/mesaplane-server/src/rate_limit.rs
// ============================================================================
// Module: Request Layer Rate Limiter
// Description: Fixed-window per-client request limiter with a stoppable
//              background sweeper.
// Purpose: Bound the buckets map in memory and give clients a retry hint
//          without pulling in an external rate-limit crate.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`RateLimiter::check`] is the same fixed-window-with-eviction design the
//! teacher's MCP server uses for its JSON-RPC endpoint: a
//! `Mutex<HashMap<ClientKey, Bucket>>` rather than a sharded or
//! external-crate limiter, evicted opportunistically when the map grows
//! past `max_entries`. [`RateLimiter::spawn_sweeper`] adds a periodic sweep
//! so idle buckets are reclaimed even without new traffic forcing an
//! eviction pass; the supervisor stops it the same way every other
//! background loop in this system is stopped, via a `oneshot` signal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::oneshot;

/// Client identity the limiter buckets on; default is the remote address.
pub type ClientKey = String;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration, in milliseconds.
    pub window_ms: u64,
    /// Maximum distinct bucket entries before eviction is forced.
    pub max_entries: usize,
    /// Sweep cadence for the background eviction loop.
    pub sweep_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_requests: 120, window_ms: 60_000, max_entries: 10_000, sweep_interval: Duration::from_secs(60) }
    }
}

/// Rolling state for a single client's bucket.
struct Bucket {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request proceeds.
    Allow,
    /// Request is over its bucket's quota.
    Limited {
        /// Milliseconds until the bucket's window resets.
        retry_after_ms: u64,
    },
    /// The bucket map is over capacity even after eviction; fail closed.
    OverCapacity,
}

/// Fixed-window limiter shared across every request handler.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<ClientKey, Bucket>>,
}

impl RateLimiter {
    /// Builds a limiter from `config`, with an empty bucket map.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Checks and updates the bucket for `key`, returning whether the
    /// request is allowed.
    #[must_use]
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let window = Duration::from_millis(self.config.window_ms);
        let ttl = Duration::from_millis(self.config.window_ms.saturating_mul(2));
        let now = Instant::now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return RateLimitDecision::OverCapacity;
        };

        if buckets.len() > self.config.max_entries {
            buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= ttl);
        }
        if buckets.len() > self.config.max_entries {
            return RateLimitDecision::OverCapacity;
        }

        let bucket =
            buckets.entry(key.to_string()).or_insert(Bucket { window_start: now, count: 0, last_seen: now });
        if now.duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.last_seen = now;

        if bucket.count >= self.config.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after_ms = u64::try_from(window.saturating_sub(elapsed).as_millis()).unwrap_or(u64::MAX);
            RateLimitDecision::Limited { retry_after_ms }
        } else {
            bucket.count = bucket.count.saturating_add(1);
            RateLimitDecision::Allow
        }
    }

    /// Spawns the background eviction loop, sweeping every
    /// `config.sweep_interval` until `stop` resolves.
    pub fn spawn_sweeper(self: &std::sync::Arc<Self>, mut stop: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let limiter = std::sync::Arc::clone(self);
        let interval = limiter.config.sweep_interval;
        let ttl = Duration::from_millis(limiter.config.window_ms.saturating_mul(2));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        if let Ok(mut buckets) = limiter.buckets.lock() {
                            buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= ttl);
                        }
                    }
                    _ = &mut stop => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn allows_requests_under_the_quota() {
        let limiter = RateLimiter::new(RateLimiterConfig { max_requests: 3, ..RateLimiterConfig::default() });
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
    }

    #[test]
    fn rejects_the_request_past_the_quota() {
        let limiter = RateLimiter::new(RateLimiterConfig { max_requests: 1, ..RateLimiterConfig::default() });
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
        assert!(matches!(limiter.check("client-a"), RateLimitDecision::Limited { .. }));
    }

    #[test]
    fn distinct_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(RateLimiterConfig { max_requests: 1, ..RateLimiterConfig::default() });
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
        assert_eq!(limiter.check("client-b"), RateLimitDecision::Allow);
    }

    #[test]
    fn over_capacity_map_fails_closed() {
        let limiter = RateLimiter::new(RateLimiterConfig { max_entries: 1, ..RateLimiterConfig::default() });
        assert_eq!(limiter.check("client-a"), RateLimitDecision::Allow);
        assert_eq!(limiter.check("client-b"), RateLimitDecision::OverCapacity);
    }

    #[tokio::test]
    async fn sweeper_stops_when_signalled() {
        let limiter = std::sync::Arc::new(RateLimiter::new(RateLimiterConfig {
            sweep_interval: Duration::from_millis(10),
            ..RateLimiterConfig::default()
        }));
        let (tx, rx) = oneshot::channel();
        let handle = limiter.spawn_sweeper(rx);
        tx.send(()).expect("send stop");
        handle.await.expect("sweeper task joins cleanly");
    }
}
