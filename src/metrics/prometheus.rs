//! Prometheus metrics for the decision engine.
//!
//! Counters and gauges are always live (plain atomic operations); a
//! [`Registry`] is only needed to expose them for scraping.
//!
//! ```ignore
//! let registry = prometheus::Registry::new();
//! let runtime = DeciderBuilder::new()
//!     .prometheus_registry(registry.clone())
//!     .build()?;
//!
//! let mut buffer = Vec::new();
//! TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
//! ```

use prometheus::{Gauge, IntCounter, IntGauge, Opts, Registry};

/// Engine metrics with a configurable name prefix.
#[derive(Clone)]
pub struct DeciderMetrics {
    // === Gauges ===
    /// SLO risk multiplier
    pub mu_slo: Gauge,

    /// Fairness penalty coefficient (ms per unit intensity)
    pub gamma_fair_ms: Gauge,

    /// Current exploration probability
    pub explore_epsilon: Gauge,

    /// Rolling violation rate
    pub viol_rate: Gauge,

    /// Edge capacity factor
    pub capacity_factor: Gauge,

    /// Healthy edge replicas at last scrape
    pub edges_up: IntGauge,

    /// Drift score of the watched signal
    pub drift_score: Gauge,

    /// Effective sample count of the drift estimator
    pub drift_window: Gauge,

    // === Counters ===
    pub decisions_total: IntCounter,
    pub explore_decisions: IntCounter,
    pub quota_denials: IntCounter,
    pub breaker_skips: IntCounter,
    pub predictor_calls: IntCounter,
    pub predictor_failures: IntCounter,
    pub fairness_switches: IntCounter,
    /// Decisions where nothing could be scored
    pub fallback_decisions: IntCounter,
    pub telemetry_sent: IntCounter,
    pub telemetry_dropped: IntCounter,
    pub telemetry_failed: IntCounter,
}

impl Default for DeciderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize_prefix(prefix: &str) -> String {
    // Valid chars: [a-zA-Z_:] first, [a-zA-Z0-9_:] after
    prefix
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let ok = if i == 0 {
                c.is_ascii_alphabetic() || c == '_' || c == ':'
            } else {
                c.is_ascii_alphanumeric() || c == '_' || c == ':'
            };
            if ok {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn gauge(prefix: &str, name: &str, help: &str) -> Gauge {
    Gauge::with_opts(Opts::new(format!("{prefix}_{name}"), help))
        .expect("metric creation should not fail")
}

fn counter(prefix: &str, name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(format!("{prefix}_{name}"), help))
        .expect("metric creation should not fail")
}

impl DeciderMetrics {
    /// Create metrics with the default prefix "decider".
    pub fn new() -> Self {
        Self::with_prefix("decider")
    }

    /// Create metrics named `{prefix}_...`.
    ///
    /// Characters that are not valid in a Prometheus metric name are
    /// replaced with underscores (`"my-app"` becomes `my_app_mu_slo`).
    pub fn with_prefix(prefix: &str) -> Self {
        let p = sanitize_prefix(prefix);
        Self {
            mu_slo: gauge(&p, "mu_slo", "SLO risk multiplier"),
            gamma_fair_ms: gauge(&p, "gamma_fair_ms", "Fairness penalty coefficient (ms)"),
            explore_epsilon: gauge(&p, "explore_epsilon", "Exploration probability"),
            viol_rate: gauge(&p, "viol_rate", "Rolling SLO violation rate"),
            capacity_factor: gauge(&p, "capacity_factor", "Edge capacity factor"),
            edges_up: IntGauge::with_opts(Opts::new(
                format!("{p}_edges_up"),
                "Healthy edge replicas at last scrape",
            ))
            .expect("metric creation should not fail"),
            drift_score: gauge(&p, "drift_score", "Drift score of the watched signal"),
            drift_window: gauge(&p, "drift_window", "Effective drift sample count"),

            decisions_total: counter(&p, "decisions_total", "Decisions made"),
            explore_decisions: counter(&p, "explore_decisions", "Epsilon-greedy overrides"),
            quota_denials: counter(&p, "quota_denials", "Decisions short-circuited by quota"),
            breaker_skips: counter(&p, "breaker_skips", "Actions skipped while breaker open"),
            predictor_calls: counter(&p, "predictor_calls", "Predictor calls issued"),
            predictor_failures: counter(&p, "predictor_failures", "Predictor calls failed"),
            fairness_switches: counter(&p, "fairness_switches", "Fairness reassignments"),
            fallback_decisions: counter(&p, "fallback_decisions", "Decisions with nothing scored"),
            telemetry_sent: counter(&p, "telemetry_sent", "Telemetry events delivered"),
            telemetry_dropped: counter(&p, "telemetry_dropped", "Telemetry events dropped on full queue"),
            telemetry_failed: counter(&p, "telemetry_failed", "Telemetry deliveries failed"),
        }
    }

    /// Register all metrics with a Registry for exposition.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g. duplicate names).
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        for g in [
            &self.mu_slo,
            &self.gamma_fair_ms,
            &self.explore_epsilon,
            &self.viol_rate,
            &self.capacity_factor,
            &self.drift_score,
            &self.drift_window,
        ] {
            registry.register(Box::new(g.clone()))?;
        }
        registry.register(Box::new(self.edges_up.clone()))?;
        for c in [
            &self.decisions_total,
            &self.explore_decisions,
            &self.quota_denials,
            &self.breaker_skips,
            &self.predictor_calls,
            &self.predictor_failures,
            &self.fairness_switches,
            &self.fallback_decisions,
            &self.telemetry_sent,
            &self.telemetry_dropped,
            &self.telemetry_failed,
        ] {
            registry.register(Box::new(c.clone()))?;
        }
        Ok(())
    }

    /// Publish the two dual variables.
    #[inline]
    pub fn set_lagrange(&self, mu_slo: f64, gamma_fair_ms: f64) {
        self.mu_slo.set(mu_slo);
        self.gamma_fair_ms.set(gamma_fair_ms);
    }

    #[inline]
    pub fn set_capacity(&self, factor: f64, edges_up: u32) {
        self.capacity_factor.set(factor);
        self.edges_up.set(edges_up as i64);
    }

    #[inline]
    pub fn set_drift(&self, score: f64, window: f64) {
        self.drift_score.set(score);
        self.drift_window.set(window);
    }
}

impl std::fmt::Debug for DeciderMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeciderMetrics")
            .field("decisions_total", &self.decisions_total.get())
            .field("explore_decisions", &self.explore_decisions.get())
            .field("quota_denials", &self.quota_denials.get())
            .field("mu_slo", &self.mu_slo.get())
            .finish()
    }
}
