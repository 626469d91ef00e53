//! Configuration types for the decision engine.

use std::time::Duration;

use prometheus::Registry;
use serde::{Deserialize, Serialize};

use crate::control::{
    BreakerKnobs, CapacityKnobs, DriftKnobs, ExplorationKnobs, FairnessKnobs, QuotaKnobs, SloKnobs,
};
use crate::error::{DeciderError, Result};

/// Utility function weights and scoring options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveKnobs {
    /// Weight on predicted energy (ms per joule).
    /// Default: 80.0
    pub lambda_energy: f64,

    /// Base SLO penalty weight; the live risk multiplier is added on top.
    /// Default: 2.0
    pub alpha_slo_base: f64,

    /// Cap on the latency noise std used for sampling (ms).
    /// Default: 8.0
    pub explore_std_cap: f64,

    /// Std of the independent tie-breaking jitter added to each utility.
    /// Default: 0.5
    pub jitter_std: f64,

    /// Use the predictor's conformal p95 instead of `mean + p95_z * std`.
    /// Default: true
    pub use_conformal: bool,

    /// Default: 1.645
    pub p95_z: f64,

    /// Returned on quota denial when the feasible list is empty.
    /// Default: "local:low"
    pub fallback_action: String,

    /// Lower bound applied to predicted variances.
    /// Default: 1e-9
    pub variance_floor: f64,
}

impl Default for ObjectiveKnobs {
    fn default() -> Self {
        Self {
            lambda_energy: 80.0,
            alpha_slo_base: 2.0,
            explore_std_cap: 8.0,
            jitter_std: 0.5,
            use_conformal: true,
            p95_z: 1.645,
            fallback_action: "local:low".to_string(),
            variance_floor: 1e-9,
        }
    }
}

/// Predictor client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorKnobs {
    /// Base URL; requests go to `{url}/predict`.
    pub url: String,

    /// Per-call budget (ms); further capped by the decision deadline.
    /// Default: 600
    pub timeout_ms: u64,
}

impl Default for PredictorKnobs {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7001".to_string(),
            timeout_ms: 600,
        }
    }
}

impl PredictorKnobs {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Telemetry queue settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryKnobs {
    /// Ingestion endpoint. `None` disables telemetry.
    pub url: Option<String>,

    /// Queue capacity; events beyond it are dropped.
    /// Default: 1024
    pub capacity: usize,

    /// Number of delivery workers.
    /// Default: 2
    pub workers: usize,

    /// Per-delivery timeout (ms).
    /// Default: 300
    pub timeout_ms: u64,
}

impl Default for TelemetryKnobs {
    fn default() -> Self {
        Self {
            url: Some("http://127.0.0.1:9105/ingest".to_string()),
            capacity: 1024,
            workers: 2,
            timeout_ms: 300,
        }
    }
}

impl TelemetryKnobs {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the decision engine and its runtime.
///
/// Deserializable from TOML, YAML, JSON, or environment variables using
/// figment. Every section may be partially specified.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeciderConfig {
    /// Metric and thread name prefix (default: "decider")
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// RNG seed; `None` seeds from entropy
    #[serde(default)]
    pub seed: Option<u64>,

    /// Budget for the whole predictor loop of one decision. Falls back to
    /// `predictor.timeout_ms` when unset.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Number of tokio worker threads (default: 2)
    #[serde(default)]
    pub tokio_threads: Option<usize>,

    #[serde(default)]
    pub objective: ObjectiveKnobs,

    #[serde(default)]
    pub predictor: PredictorKnobs,

    #[serde(default)]
    pub breaker: BreakerKnobs,

    #[serde(default)]
    pub quota: QuotaKnobs,

    #[serde(default)]
    pub fairness: FairnessKnobs,

    #[serde(default)]
    pub slo: SloKnobs,

    #[serde(default)]
    pub exploration: ExplorationKnobs,

    #[serde(default)]
    pub capacity: CapacityKnobs,

    #[serde(default)]
    pub drift: DriftKnobs,

    #[serde(default)]
    pub telemetry: TelemetryKnobs,

    /// Prometheus registry for metrics exposition.
    /// Not serializable - must be set programmatically.
    #[serde(skip)]
    pub prometheus_registry: Option<Registry>,
}

fn default_prefix() -> String {
    "decider".to_string()
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            seed: None,
            request_timeout_ms: None,
            tokio_threads: None,
            objective: ObjectiveKnobs::default(),
            predictor: PredictorKnobs::default(),
            breaker: BreakerKnobs::default(),
            quota: QuotaKnobs::default(),
            fairness: FairnessKnobs::default(),
            slo: SloKnobs::default(),
            exploration: ExplorationKnobs::default(),
            capacity: CapacityKnobs::default(),
            drift: DriftKnobs::default(),
            telemetry: TelemetryKnobs::default(),
            prometheus_registry: None,
        }
    }
}

impl DeciderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with every network dependency disabled.
    ///
    /// Capacity polling and telemetry are off; the predictor still has to be
    /// supplied by the caller.
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.capacity.url = None;
        config.telemetry.url = None;
        config
    }

    pub fn effective_tokio_threads(&self) -> usize {
        self.tokio_threads.unwrap_or(2).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.predictor.timeout())
    }

    /// Reject structurally impossible values.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(DeciderError::InvalidConfig(msg.into()))
        }

        let knobs = [
            ("objective.lambda_energy", self.objective.lambda_energy),
            ("objective.alpha_slo_base", self.objective.alpha_slo_base),
            ("objective.explore_std_cap", self.objective.explore_std_cap),
            ("objective.jitter_std", self.objective.jitter_std),
            ("objective.p95_z", self.objective.p95_z),
            ("objective.variance_floor", self.objective.variance_floor),
            ("quota.rate", self.quota.rate),
            ("quota.burst", self.quota.burst),
            ("quota.cost", self.quota.cost),
            ("fairness.ewma_alpha", self.fairness.ewma_alpha),
            ("fairness.gamma_ms", self.fairness.gamma_ms),
            ("slo.target_rate", self.slo.target_rate),
            ("slo.eta", self.slo.eta),
            ("slo.initial_mu", self.slo.initial_mu),
            ("exploration.epsilon", self.exploration.epsilon),
            ("exploration.epsilon_min", self.exploration.epsilon_min),
            ("exploration.epsilon_max", self.exploration.epsilon_max),
            ("exploration.shrink", self.exploration.shrink),
            ("exploration.grow", self.exploration.grow),
            ("capacity.coef", self.capacity.coef),
            ("capacity.floor", self.capacity.floor),
            ("drift.window", self.drift.window),
            ("drift.decay", self.drift.decay),
            ("drift.warmup", self.drift.warmup),
        ];
        if let Some((name, value)) = knobs.iter().find(|(_, v)| !v.is_finite()) {
            return invalid(format!("{name} must be finite, got {value}"));
        }
        if self.slo.window == 0 {
            return invalid("slo.window must be at least 1");
        }
        if self.exploration.epsilon_min > self.exploration.epsilon_max {
            return invalid(format!(
                "exploration.epsilon_min ({}) exceeds epsilon_max ({})",
                self.exploration.epsilon_min, self.exploration.epsilon_max
            ));
        }
        if !(self.quota.burst > 0.0) {
            return invalid("quota.burst must be positive");
        }
        if self.quota.rate < 0.0 || self.quota.cost < 0.0 {
            return invalid("quota.rate and quota.cost must be non-negative");
        }
        if !(self.capacity.floor > 0.0 && self.capacity.floor <= 1.0) {
            return invalid(format!(
                "capacity.floor ({}) must be in (0, 1]",
                self.capacity.floor
            ));
        }
        if self.telemetry.capacity == 0 || self.telemetry.workers == 0 {
            return invalid("telemetry.capacity and telemetry.workers must be at least 1");
        }
        Ok(())
    }
}
