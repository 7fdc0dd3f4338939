//! Admission limiting for inbound requests.
//!
//! Every request is checked against a per-client counter before any
//! authentication work is done. Two algorithms sit behind the
//! [`AdmissionLimiter`] trait:
//! - [`FixedWindowLimiter`]: counter reset at fixed frame boundaries (default)
//! - [`TokenBucketLimiter`]: `governor` keyed GCRA with burst = frame quota
//!
//! # Concurrency
//!
//! The fixed-window check-and-increment runs while holding the DashMap
//! shard write guard for the key, so concurrent requests from the same
//! client observe a linearizable counter. Governor's keyed state uses an
//! atomic compare-and-swap per key.

use crate::config::{LimiterAlgorithm, RateLimiterConfig};
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// How long the client should wait before retrying. Zero when allowed.
    pub retry_after: Duration,
}

impl Admission {
    pub const fn admitted() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    pub const fn rejected(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// Per-client request admission.
pub trait AdmissionLimiter: Send + Sync {
    /// Record one request for `client_key` and decide whether to admit it.
    fn allow(&self, client_key: &str) -> Admission;

    /// Number of client keys currently tracked.
    fn tracked_clients(&self) -> usize;
}

/// Rate-limits full-table pruning to once per interval.
#[derive(Debug)]
struct PruneSchedule {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl PruneSchedule {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Claim the next prune if at least one interval has passed since the last.
    fn due(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        let due = last.is_none_or(|at| now.saturating_duration_since(at) >= self.interval);
        if due {
            *last = Some(now);
        }
        due
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window counter per client key.
///
/// Admits up to `requests_per_frame` requests per frame; bursts of up to
/// twice that rate are possible across a frame boundary.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    requests_per_frame: u32,
    frame: Duration,
    max_tracked: usize,
    pruning: PruneSchedule,
}

impl FixedWindowLimiter {
    pub fn new(requests_per_frame: u32, frame: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            requests_per_frame,
            frame,
            max_tracked: usize::MAX,
            pruning: PruneSchedule::new(frame),
        }
    }

    /// Prune elapsed windows once `max` clients are tracked, at most once
    /// per frame.
    pub fn with_max_tracked(mut self, max: usize) -> Self {
        self.max_tracked = max;
        self
    }

    /// Admission decision for a request arriving at `now`.
    pub fn allow_at(&self, client_key: &str, now: Instant) -> Admission {
        if let Some(mut window) = self.windows.get_mut(client_key) {
            return self.step(&mut window, now);
        }

        if self.windows.len() >= self.max_tracked && self.pruning.due(now) {
            self.prune(now);
        }

        let mut window = self
            .windows
            .entry(client_key.to_owned())
            .or_insert(Window {
                count: 0,
                started: now,
            });
        self.step(&mut window, now)
    }

    fn step(&self, window: &mut Window, now: Instant) -> Admission {
        if now.saturating_duration_since(window.started) >= self.frame {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.requests_per_frame {
            let elapsed = now.saturating_duration_since(window.started);
            Admission::rejected(self.frame.saturating_sub(elapsed))
        } else {
            Admission::admitted()
        }
    }

    /// Drop windows whose frame has elapsed. Returns the number removed.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.frame);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "pruned elapsed admission windows");
        }
        removed
    }
}

impl AdmissionLimiter for FixedWindowLimiter {
    fn allow(&self, client_key: &str) -> Admission {
        self.allow_at(client_key, Instant::now())
    }

    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Token bucket per client key, backed by governor.
pub struct TokenBucketLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
    max_tracked: usize,
    pruning: PruneSchedule,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("tracked", &self.limiter.len())
            .field("max_tracked", &self.max_tracked)
            .finish()
    }
}

impl TokenBucketLimiter {
    /// Burst of `requests_per_frame`, one token replenished every
    /// `frame / requests_per_frame`.
    pub fn new(requests_per_frame: u32, frame: Duration) -> Self {
        let burst = NonZeroU32::new(requests_per_frame).unwrap_or(nonzero!(1u32));
        let mut period = frame / burst.get();
        if period.is_zero() {
            period = Duration::from_nanos(1);
        }
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        let clock = DefaultClock::default();
        Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), &clock),
            clock,
            max_tracked: usize::MAX,
            pruning: PruneSchedule::new(frame),
        }
    }

    pub fn with_max_tracked(mut self, max: usize) -> Self {
        self.max_tracked = max;
        self
    }
}

impl AdmissionLimiter for TokenBucketLimiter {
    fn allow(&self, client_key: &str) -> Admission {
        if self.limiter.len() >= self.max_tracked && self.pruning.due(Instant::now()) {
            self.limiter.retain_recent();
        }
        match self.limiter.check_key(&client_key.to_owned()) {
            Ok(()) => Admission::admitted(),
            Err(not_until) => Admission::rejected(not_until.wait_time_from(self.clock.now())),
        }
    }

    fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Admission front door: applies the configured limiter, exemptions and
/// the enabled switch.
pub struct RateLimitManager {
    limiter: Option<Box<dyn AdmissionLimiter>>,
    exempt: HashSet<String>,
}

impl std::fmt::Debug for RateLimitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitManager")
            .field("enabled", &self.limiter.is_some())
            .field("exempt", &self.exempt.len())
            .finish()
    }
}

impl RateLimitManager {
    /// Create a manager with the given configuration.
    pub fn new(config: &RateLimiterConfig) -> Self {
        let limiter: Option<Box<dyn AdmissionLimiter>> = if !config.enabled {
            None
        } else {
            match config.algorithm {
                LimiterAlgorithm::FixedWindow => Some(Box::new(
                    FixedWindowLimiter::new(config.requests_per_frame, config.frame())
                        .with_max_tracked(config.max_tracked_clients),
                )),
                LimiterAlgorithm::TokenBucket => Some(Box::new(
                    TokenBucketLimiter::new(config.requests_per_frame, config.frame())
                        .with_max_tracked(config.max_tracked_clients),
                )),
            }
        };

        Self {
            limiter,
            exempt: config.exempt_clients.iter().cloned().collect(),
        }
    }

    /// Wrap an explicit limiter (no exemptions).
    pub fn with_limiter(limiter: Box<dyn AdmissionLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
            exempt: HashSet::new(),
        }
    }

    /// A manager that admits everything.
    pub fn disabled() -> Self {
        Self {
            limiter: None,
            exempt: HashSet::new(),
        }
    }

    /// Check whether a request from `client_key` is admitted.
    pub fn allow(&self, client_key: &str) -> Admission {
        let Some(limiter) = &self.limiter else {
            return Admission::admitted();
        };
        if self.exempt.contains(client_key) {
            return Admission::admitted();
        }

        let admission = limiter.allow(client_key);
        if !admission.allowed {
            debug!(
                client = %client_key,
                retry_after_ms = admission.retry_after.as_millis() as u64,
                "admission limit exceeded"
            );
        }
        admission
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |l| l.tracked_clients())
    }
}
