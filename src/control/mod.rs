//! Adaptive controllers feeding the decision loop.
//!
//! Each controller owns its own state behind its own lock or atomics; there
//! is no global lock across controllers, so unrelated requests never
//! serialize on each other.
//!
//! | Controller | Role in a decision |
//! |------------|--------------------|
//! | [`CircuitBreaker`] | skip predictor calls while the predictor is failing |
//! | [`QuotaManager`] | per-tenant admission before any prediction work |
//! | [`CapacityPoller`] | inflate edge latency and cost when edge replicas are lost |
//! | [`DriftWatcher`] | drift score of an external signal (observability only) |
//! | [`FairnessTracker`] | penalize tenants above the mean resource intensity |
//! | [`SloController`] | tune the SLO risk multiplier from the violation rate |
//! | [`ExplorationGovernor`] | shrink or grow the epsilon-greedy rate |
//!
//! Background loops (governor ticks, capacity scrapes) are driven by the
//! engine; the controllers themselves never spawn tasks.

mod breaker;
mod capacity;
mod drift;
mod exploration;
mod fairness;
mod knobs;
mod quota;
mod slo;

pub use breaker::CircuitBreaker;
pub use capacity::{capacity_factor, parse_gauge, CapacityPoller};
pub use drift::{DriftSnapshot, DriftWatcher};
pub use exploration::ExplorationGovernor;
pub use fairness::FairnessTracker;
pub use knobs::{
    BreakerKnobs, CapacityKnobs, DriftKnobs, ExplorationKnobs, FairnessKnobs, QuotaKnobs, SloKnobs,
};
pub use quota::{QuotaManager, TokenBucket};
pub use slo::SloController;
