//! Metrics for decision-engine observability.
//!
//! Metrics are always collected; exposing them only requires passing a
//! Prometheus registry to the builder.
//!
//! # Available Metrics
//!
//! ## Gauges
//!
//! - `decider_mu_slo` - SLO risk multiplier
//! - `decider_gamma_fair_ms` - fairness penalty coefficient
//! - `decider_explore_epsilon` - current exploration probability
//! - `decider_viol_rate` - rolling violation rate
//! - `decider_capacity_factor` / `decider_edges_up` - edge capacity
//! - `decider_drift_score` / `decider_drift_window` - drift watcher state
//!
//! ## Counters
//!
//! - `decider_decisions_total`, `decider_explore_decisions`, `decider_fallback_decisions`
//! - `decider_quota_denials`, `decider_breaker_skips`
//! - `decider_predictor_calls`, `decider_predictor_failures`
//! - `decider_fairness_switches`
//! - `decider_telemetry_sent`, `decider_telemetry_dropped`, `decider_telemetry_failed`

mod prometheus;

pub use prometheus::DeciderMetrics;
