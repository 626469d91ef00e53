//! Cross-tenant fairness on resource-intensive placements.
//!
//! Each tenant carries an EWMA of the resource intensity of its chosen
//! actions. A tenant is penalized only relative to the current population:
//!
//! ```text
//! penalty = gamma * max(0, ewma_tenant - mean(ewma_all_tenants))
//! ```
//!
//! so fairness pressure is zero whenever all tenants are equally loaded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::knobs::FairnessKnobs;

/// Per-tenant intensity EWMA with a self-relative penalty.
#[derive(Debug)]
pub struct FairnessTracker {
    ewma: Mutex<HashMap<String, f64>>,
    alpha: f64,
    /// Penalty coefficient (f64 bits), tunable at runtime
    gamma_bits: AtomicU64,
}

impl FairnessTracker {
    pub fn new(alpha: f64, gamma: f64) -> Self {
        Self {
            ewma: Mutex::new(HashMap::new()),
            alpha: alpha.clamp(0.0, 1.0),
            gamma_bits: AtomicU64::new(gamma.max(0.0).to_bits()),
        }
    }

    pub fn from_knobs(knobs: &FairnessKnobs) -> Self {
        Self::new(knobs.ewma_alpha, knobs.gamma_ms)
    }

    /// Fold `intensity` into the tenant's EWMA and return its penalty.
    ///
    /// The first observation for a tenant sets the EWMA directly instead of
    /// decaying up from zero.
    pub fn observe(&self, tenant: &str, intensity: f64) -> f64 {
        let gamma = self.gamma();
        let mut map = self.ewma.lock();
        let updated = match map.get(tenant) {
            Some(&prev) => self.alpha * intensity + (1.0 - self.alpha) * prev,
            None => intensity,
        };
        map.insert(tenant.to_string(), updated);
        let mean = map.values().sum::<f64>() / map.len() as f64;
        penalty(gamma, updated, mean)
    }

    /// Current penalty for `tenant` without recording anything.
    pub fn penalty(&self, tenant: &str) -> f64 {
        let gamma = self.gamma();
        let map = self.ewma.lock();
        match map.get(tenant) {
            Some(&v) => {
                let mean = map.values().sum::<f64>() / map.len() as f64;
                penalty(gamma, v, mean)
            }
            None => 0.0,
        }
    }

    pub fn ewma(&self, tenant: &str) -> Option<f64> {
        self.ewma.lock().get(tenant).copied()
    }

    /// Mean EWMA across all known tenants (0 when none).
    pub fn mean(&self) -> f64 {
        let map = self.ewma.lock();
        if map.is_empty() {
            0.0
        } else {
            map.values().sum::<f64>() / map.len() as f64
        }
    }

    pub fn gamma(&self) -> f64 {
        f64::from_bits(self.gamma_bits.load(Ordering::Relaxed))
    }

    /// Overwrite the penalty coefficient. Negative values clamp to zero.
    pub fn set_gamma(&self, gamma: f64) {
        self.gamma_bits
            .store(gamma.max(0.0).to_bits(), Ordering::Relaxed);
    }
}

fn penalty(gamma: f64, tenant: f64, mean: f64) -> f64 {
    let over = tenant - mean;
    if over <= 0.0 {
        0.0
    } else {
        gamma * over
    }
}
