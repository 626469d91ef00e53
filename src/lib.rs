//! # offload-decider
//!
//! **Online placement decisions for compute offload**
//!
//! Given a request [`Context`] (network, device, battery, input size, p95
//! latency budget) and an ordered list of feasible placements such as
//! `"local:low"`, `"edge:med"` or `"cloud:high"`, the [`DecisionEngine`]
//! picks the placement with the best trade-off between predicted latency,
//! energy, SLO risk, placement cost and per-tenant fairness, while tuning
//! its own risk aversion and exploration rate from observed outcomes.
//!
//! ## Features
//!
//! - **Quota admission**: per-tenant token buckets bound the rate into the prediction path
//! - **Circuit breaker**: a failing predictor is skipped with a safe fallback
//! - **Primal-dual SLO control**: a risk multiplier follows the rolling violation rate
//! - **Fairness**: tenants above the mean resource intensity are steered to lighter placements
//! - **Exploration governor**: epsilon-greedy rate shrinks under violation pressure
//! - **Capacity and drift signals**: edge replica count and distribution drift feed the loop
//! - **Best-effort telemetry**: bounded queue, worker pool, drop-on-full
//! - **Flexible Configuration**: files (TOML/YAML/JSON), environment variables, code, CLI
//! - **Prometheus metrics**: always collected, optionally registered
//!
//! ## Quick Start
//!
//! ```ignore
//! use offload_decider::{Context, DeciderBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = DeciderBuilder::new()
//!         .prefix("csn")
//!         .env_prefix("CSN")
//!         .predictor_url("http://127.0.0.1:7001")
//!         .build()?;
//!
//!     let decision = runtime.block_on(async {
//!         let ctx = Context::for_tenant("acme", 150.0);
//!         runtime
//!             .engine()
//!             .decide(&ctx, &["local:low", "edge:med", "cloud:high"])
//!             .await
//!     });
//!     println!("chose {} (explore={})", decision.action, decision.explore);
//!
//!     // Operators can retune the dual variables live
//!     runtime.engine().apply_lagrange_form("mu_slo=1.0&gamma_fair_ms=20");
//!
//!     runtime.block_until_idle();
//!     Ok(())
//! }
//! ```
//!
//! ## Embedding
//!
//! Inside an existing tokio runtime, build only the engine and start its
//! background loops yourself:
//!
//! ```ignore
//! let engine = Arc::new(DeciderBuilder::new().build_engine()?);
//! let tracker = TaskTracker::new();
//! let cancel = CancellationToken::new();
//! engine.spawn_background(&Handle::current(), &tracker, &cancel);
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! prefix = "csn"
//! seed = 7
//!
//! [objective]
//! use_conformal = true
//! lambda_energy = 80.0
//!
//! [quota]
//! rate = 50.0
//! burst = 100.0
//!
//! [capacity]
//! url = "http://127.0.0.1:9103/metrics"
//! coef = 0.15
//! floor = 0.3
//! ```
//!
//! Environment overrides use `{PREFIX}_{SECTION}__{KEY}`, e.g.
//! `CSN_CAPACITY__COEF=0.2`.

pub mod action;
pub mod builder;
pub mod config;
pub mod context;
pub mod control;
pub mod control_plane;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod predictor;
pub mod runtime;
pub mod telemetry;

pub use action::{Action, CostTier, PlacementKind};
pub use builder::{DeciderArgs, DeciderBuilder};
pub use config::{DeciderConfig, ObjectiveKnobs, PredictorKnobs, TelemetryKnobs};
pub use context::Context;
pub use control_plane::{LagrangeSnapshot, LagrangeUpdate};
pub use engine::{Decision, DecisionEngine, DecisionPath, ScoredAction};
pub use error::{DeciderError, PredictorError, Result, TelemetryError};
pub use metrics::DeciderMetrics;
pub use predictor::{HttpPredictor, PredictionSample, Predictor};
pub use runtime::DeciderRuntime;
pub use telemetry::{
    HttpTelemetrySink, MemoryTelemetrySink, TelemetryEvent, TelemetryQueue, TelemetrySink,
};
