//! Error types for offload-decider.
//!
//! Only construction can fail. Once an engine is running, predictor and
//! telemetry failures are ordinary per-call outcomes that the engine absorbs;
//! `decide()` itself never returns an error.

use thiserror::Error;

/// Errors that can occur when building a decision engine or its runtime.
#[derive(Debug, Error)]
pub enum DeciderError {
    /// Error extracting configuration from figment.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A configuration value is structurally impossible.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error building the tokio runtime.
    #[error("failed to build tokio runtime: {0}")]
    TokioRuntime(#[from] std::io::Error),

    /// Error building an HTTP client for an upstream dependency.
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Failure of a single predictor call.
///
/// The engine treats every variant the same way: the action is unavailable
/// for this round and the circuit breaker records a failure.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The call did not finish within its per-call budget.
    #[error("predictor call timed out")]
    Timeout,

    /// Transport-level failure (connect, reset, decode).
    #[error("predictor transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The predictor answered with a non-success status.
    #[error("predictor returned status {0}")]
    Status(u16),

    /// The predictor declined to answer for this action.
    #[error("predictor unavailable: {0}")]
    Unavailable(String),
}

/// Failure delivering one telemetry event. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Transport-level failure.
    #[error("telemetry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sink answered with a non-success status.
    #[error("telemetry sink returned status {0}")]
    Status(u16),

    /// Delivery exceeded its timeout.
    #[error("telemetry delivery timed out")]
    Timeout,
}

/// Result type alias for construction-time operations.
pub type Result<T> = std::result::Result<T, DeciderError>;
