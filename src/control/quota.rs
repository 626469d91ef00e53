//! Per-tenant token bucket admission control.
//!
//! Buckets refill continuously at `rate` tokens per second up to `burst`.
//! Refill is computed lazily on every admission check from the elapsed wall
//! clock; there is no refill task. Each tenant gets its own bucket lock; the
//! tenant map lock is held only to find or create a bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::knobs::QuotaKnobs;

/// A single token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(rate: f64, burst: f64) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    pub(crate) fn new_at(rate: f64, burst: f64, now: Instant) -> Self {
        Self {
            rate: rate.max(0.0),
            burst: burst.max(0.0),
            tokens: burst.max(0.0),
            last_refill: now,
        }
    }

    /// Refill, then admit iff at least `cost` tokens are available.
    pub fn allow(&mut self, cost: f64) -> bool {
        self.allow_at(cost, Instant::now())
    }

    pub(crate) fn allow_at(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (without refilling).
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }
}

/// Lazily created token buckets keyed by tenant.
///
/// Buckets live for the process lifetime; tenant cardinality is small and
/// operator-controlled.
#[derive(Debug)]
pub struct QuotaManager {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    rate: f64,
    burst: f64,
}

impl QuotaManager {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            rate,
            burst,
        }
    }

    pub fn from_knobs(knobs: &QuotaKnobs) -> Self {
        Self::new(knobs.rate, knobs.burst)
    }

    /// Admit one request of `cost` tokens for `tenant`.
    pub fn allow(&self, tenant: &str, cost: f64) -> bool {
        self.allow_at(tenant, cost, Instant::now())
    }

    pub(crate) fn allow_at(&self, tenant: &str, cost: f64, now: Instant) -> bool {
        let bucket = self.bucket(tenant, now);
        // Bound so the guard drops before `bucket`
        let admitted = bucket.lock().allow_at(cost, now);
        admitted
    }

    /// Number of tenants seen so far.
    pub fn tenant_count(&self) -> usize {
        self.buckets.read().len()
    }

    fn bucket(&self, tenant: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        // Fast path: read lock
        if let Some(b) = self.buckets.read().get(tenant) {
            return b.clone();
        }
        self.buckets
            .write()
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new_at(self.rate, self.burst, now))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_deny() {
        let t0 = Instant::now();
        let mut b = TokenBucket::new_at(2.0, 3.0, t0);
        assert!(b.allow_at(1.0, t0));
        assert!(b.allow_at(1.0, t0));
        assert!(b.allow_at(1.0, t0));
        assert!(!b.allow_at(1.0, t0));
    }

    #[test]
    fn test_refill_admits_exactly_one_more() {
        let rate = 4.0;
        let t0 = Instant::now();
        let mut b = TokenBucket::new_at(rate, 5.0, t0);
        for _ in 0..5 {
            assert!(b.allow_at(1.0, t0));
        }
        assert!(!b.allow_at(1.0, t0));

        // Wait exactly 1/rate seconds
        let t1 = t0 + Duration::from_secs_f64(1.0 / rate);
        assert!(b.allow_at(1.0, t1));
        assert!(!b.allow_at(1.0, t1));
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let t0 = Instant::now();
        let mut b = TokenBucket::new_at(100.0, 2.0, t0);
        assert!(b.allow_at(2.0, t0));
        b.allow_at(0.0, t0 + Duration::from_secs(60));
        assert!((b.tokens() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_tenant_isolation() {
        let q = QuotaManager::new(0.0, 1.0);
        let t0 = Instant::now();
        assert!(q.allow_at("a", 1.0, t0));
        assert!(!q.allow_at("a", 1.0, t0));
        // Tenant b has its own full bucket
        assert!(q.allow_at("b", 1.0, t0));
        assert_eq!(q.tenant_count(), 2);
    }

    #[test]
    fn test_zero_rate_never_refills() {
        let q = QuotaManager::new(0.0, 1.0);
        let t0 = Instant::now();
        assert!(q.allow_at("a", 1.0, t0));
        assert!(!q.allow_at("a", 1.0, t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn test_shared_tenant_across_threads() {
        let q = Arc::new(QuotaManager::new(0.0, 100.0));
        let t0 = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || (0..50).filter(|_| q.allow_at("a", 1.0, t0)).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(q.tenant_count(), 1);
    }
}
