//! Circuit breaker around the predictor dependency.
//!
//! Two states only: closed (calls allowed) and open (fast-fail until a
//! deadline). There is no half-open probe; once the cooldown elapses the
//! breaker is closed again and the next real failures reopen it. The
//! predictor is a soft dependency with a safe fallback, so the optimistic
//! reset is acceptable.
//!
//! All state is atomic: success/failure reports from concurrent requests
//! never contend on a lock.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

use super::knobs::BreakerKnobs;

/// Lock-free two-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Consecutive failures since the last success or trip
    failures: AtomicU32,
    /// Nanoseconds since `epoch` until which the breaker is open (0 = closed)
    open_until_ns: AtomicU64,
    max_failures: u32,
    cooldown: Duration,
    /// Reference point for the atomic timestamp
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_ns: AtomicU64::new(0),
            max_failures: max_failures.max(1),
            cooldown,
            epoch: Instant::now(),
        }
    }

    pub fn from_knobs(knobs: &BreakerKnobs) -> Self {
        Self::new(knobs.max_failures, knobs.cooldown())
    }

    /// Whether a call may go through right now.
    #[inline]
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Reset the consecutive-failure counter.
    #[inline]
    pub fn on_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Record a failure, opening the breaker once the threshold is reached.
    pub fn on_failure(&self) {
        self.on_failure_at(Instant::now());
    }

    /// Open the breaker for `duration` regardless of the failure count.
    pub fn force_open(&self, duration: Duration) {
        let until = self.nanos_since_epoch(Instant::now() + duration);
        self.open_until_ns.store(until, Ordering::Release);
    }

    /// Close the breaker immediately and forget past failures.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
        self.open_until_ns.store(0, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        !self.allow()
    }

    /// Consecutive failures recorded since the last success or trip.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn allow_at(&self, now: Instant) -> bool {
        let until = self.open_until_ns.load(Ordering::Acquire);
        until == 0 || self.nanos_since_epoch(now) >= until
    }

    pub(crate) fn on_failure_at(&self, now: Instant) {
        let n = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if n >= self.max_failures {
            self.failures.store(0, Ordering::Relaxed);
            let until = self.nanos_since_epoch(now + self.cooldown);
            self.open_until_ns.store(until, Ordering::Release);
            warn!(
                failures = n,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "predictor circuit breaker opened"
            );
        }
    }

    fn nanos_since_epoch(&self, t: Instant) -> u64 {
        // +1 keeps a real deadline distinguishable from the "closed" sentinel
        t.saturating_duration_since(self.epoch).as_nanos() as u64 + 1
    }
}
