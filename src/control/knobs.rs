//! Configuration knobs for the adaptive controllers.
//!
//! All knobs have defaults matching the reference deployment (50 rps quota
//! per tenant, 5-failure breaker, 10% violation target). Every struct is
//! `#[serde(default)]` so a config file only needs the fields it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker around the predictor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerKnobs {
    /// Consecutive failures that open the breaker.
    /// Default: 5
    pub max_failures: u32,

    /// How long the breaker stays open (ms).
    /// Default: 10000
    pub cooldown_ms: u64,
}

impl Default for BreakerKnobs {
    fn default() -> Self {
        Self {
            max_failures: 5,
            cooldown_ms: 10_000,
        }
    }
}

impl BreakerKnobs {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Per-tenant token bucket admission.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaKnobs {
    /// Refill rate (tokens per second).
    /// Default: 50.0
    pub rate: f64,

    /// Bucket capacity; new tenants start full.
    /// Default: 100.0
    pub burst: f64,

    /// Tokens consumed per decision.
    /// Default: 1.0
    pub cost: f64,
}

impl Default for QuotaKnobs {
    fn default() -> Self {
        Self {
            rate: 50.0,
            burst: 100.0,
            cost: 1.0,
        }
    }
}

/// Cross-tenant fairness penalty.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessKnobs {
    /// EWMA smoothing factor for per-tenant resource intensity.
    /// Default: 0.3
    pub ewma_alpha: f64,

    /// Penalty per unit of intensity above the tenant mean (ms).
    /// Default: 10.0
    pub gamma_ms: f64,
}

impl Default for FairnessKnobs {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.3,
            gamma_ms: 10.0,
        }
    }
}

/// Primal-dual SLO risk controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SloKnobs {
    /// Target long-run violation rate.
    /// Default: 0.10
    pub target_rate: f64,

    /// Number of recent decisions in the violation window.
    /// Default: 50
    pub window: usize,

    /// Dual ascent step size.
    /// Default: 5.0
    pub eta: f64,

    /// Minimum interval between multiplier updates (ms).
    /// Default: 5000
    pub update_every_ms: u64,

    /// Starting value of the risk multiplier.
    /// Default: 0.0
    pub initial_mu: f64,
}

impl Default for SloKnobs {
    fn default() -> Self {
        Self {
            target_rate: 0.10,
            window: 50,
            eta: 5.0,
            update_every_ms: 5_000,
            initial_mu: 0.0,
        }
    }
}

impl SloKnobs {
    pub fn update_every(&self) -> Duration {
        Duration::from_millis(self.update_every_ms)
    }
}

/// Epsilon-greedy exploration governor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationKnobs {
    /// Starting exploration probability.
    /// Default: 0.10
    pub epsilon: f64,

    /// Default: 0.01
    pub epsilon_min: f64,

    /// Default: 0.20
    pub epsilon_max: f64,

    /// Multiplier applied when the violation rate is above target.
    /// Default: 0.5
    pub shrink: f64,

    /// Multiplier applied otherwise.
    /// Default: 1.05
    pub grow: f64,

    /// Governor tick interval (ms).
    /// Default: 5000
    pub interval_ms: u64,
}

impl Default for ExplorationKnobs {
    fn default() -> Self {
        Self {
            epsilon: 0.10,
            epsilon_min: 0.01,
            epsilon_max: 0.20,
            shrink: 0.5,
            grow: 1.05,
            interval_ms: 5_000,
        }
    }
}

impl ExplorationKnobs {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Builder method to pin epsilon to a fixed value (min = max = value).
    pub fn fixed(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self.epsilon_min = epsilon;
        self.epsilon_max = epsilon;
        self
    }
}

/// Edge capacity poller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityKnobs {
    /// Text metrics endpoint to scrape. `None` disables polling (factor stays 1.0).
    pub url: Option<String>,

    /// Gauge name holding the healthy edge replica count.
    /// Default: "csn_edges_up"
    pub metric: String,

    /// Factor reduction per additional edge replica.
    /// Default: 0.15
    pub coef: f64,

    /// Lower bound of the capacity factor.
    /// Default: 0.3
    pub floor: f64,

    /// Poll interval (ms).
    /// Default: 2000
    pub interval_ms: u64,

    /// Scrape timeout (ms).
    /// Default: 1200
    pub timeout_ms: u64,
}

impl Default for CapacityKnobs {
    fn default() -> Self {
        Self {
            url: Some("http://127.0.0.1:9103/metrics".to_string()),
            metric: "csn_edges_up".to_string(),
            coef: 0.15,
            floor: 0.3,
            interval_ms: 2_000,
            timeout_ms: 1_200,
        }
    }
}

impl CapacityKnobs {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Drift watcher over an external scalar signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftKnobs {
    /// Effective sample count above which the running statistics decay.
    /// Default: 500
    pub window: f64,

    /// Decay applied to the count and squared-deviation sum past the window.
    /// Default: 0.98
    pub decay: f64,

    /// Samples required before the baseline freezes.
    /// Default: 30
    pub warmup: f64,

    /// Interval of the debug log ticker (ms).
    /// Default: 30000
    pub log_interval_ms: u64,

    /// Feed the chosen action's predicted mean latency into the watcher.
    /// Default: true
    pub feed_from_decisions: bool,
}

impl Default for DriftKnobs {
    fn default() -> Self {
        Self {
            window: 500.0,
            decay: 0.98,
            warmup: 30.0,
            log_interval_ms: 30_000,
            feed_from_decisions: true,
        }
    }
}

impl DriftKnobs {
    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }
}
