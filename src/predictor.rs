//! Latency/energy predictor contract.
//!
//! The predictor is a remote dependency returning a predicted distribution for
//! one (context, action) pair. The engine only relies on the [`Predictor`]
//! trait; [`HttpPredictor`] is the stock JSON-over-HTTP client.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{DeciderError, PredictorError};

/// Predicted outcome distribution for one (context, action) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSample {
    /// Mean latency (ms)
    pub mu_latency_ms: f64,
    /// Latency variance (ms²)
    pub var_latency: f64,
    /// Mean energy (J)
    pub mu_energy_j: f64,
    /// Energy variance (J²)
    #[serde(default)]
    pub var_energy: f64,
    /// Conformal p95 latency estimate (ms)
    pub p95_conformal_ms: f64,
}

impl PredictionSample {
    /// Floor both variances so a standard deviation is always defined.
    pub fn floored(mut self, floor: f64) -> Self {
        self.var_latency = floor_variance(self.var_latency, floor);
        self.var_energy = floor_variance(self.var_energy, floor);
        self
    }

    pub fn latency_std(&self) -> f64 {
        self.var_latency.sqrt()
    }
}

/// NaN and negative inputs also land on the floor.
fn floor_variance(v: f64, floor: f64) -> f64 {
    if v.is_nan() {
        floor
    } else {
        v.max(floor)
    }
}

/// A source of per-action predictions.
///
/// Failure is an expected outcome: the engine excludes the action for the
/// current round and reports the failure to its circuit breaker.
pub trait Predictor: Send + Sync {
    fn predict<'a>(
        &'a self,
        ctx: &'a Context,
        action: &'a str,
    ) -> BoxFuture<'a, Result<PredictionSample, PredictorError>>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    ctx: &'a Context,
    action: &'a str,
}

/// Predictor client speaking JSON over HTTP.
///
/// Sends `POST {base_url}/predict` with `{"ctx": .., "action": ".."}` and
/// expects a [`PredictionSample`] body.
#[derive(Clone, Debug)]
pub struct HttpPredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPredictor {
    /// Build a client whose transport timeout is `timeout`.
    ///
    /// The engine applies its own, usually tighter, per-call deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeciderError::HttpClient)?;
        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Predictor for HttpPredictor {
    fn predict<'a>(
        &'a self,
        ctx: &'a Context,
        action: &'a str,
    ) -> BoxFuture<'a, Result<PredictionSample, PredictorError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&PredictRequest { ctx, action })
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        PredictorError::Timeout
                    } else {
                        PredictorError::Transport(e)
                    }
                })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(PredictorError::Status(status.as_u16()));
            }
            Ok(resp.json::<PredictionSample>().await?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variance_floor() {
        let s = PredictionSample {
            mu_latency_ms: 10.0,
            var_latency: 0.0,
            mu_energy_j: 1.0,
            var_energy: -3.0,
            p95_conformal_ms: 12.0,
        }
        .floored(1e-9);
        assert_eq!(s.var_latency, 1e-9);
        assert_eq!(s.var_energy, 1e-9);
        assert!(s.latency_std() > 0.0);

        let nan = PredictionSample {
            var_latency: f64::NAN,
            ..Default::default()
        }
        .floored(1e-9);
        assert_eq!(nan.var_latency, 1e-9);
    }

    #[test]
    fn test_sample_wire_format() {
        let s: PredictionSample = serde_json::from_str(
            r#"{"mu_latency_ms":40,"var_latency":9,"mu_energy_j":0.2,"p95_conformal_ms":47}"#,
        )
        .unwrap();
        assert_eq!(s.mu_latency_ms, 40.0);
        assert_eq!(s.var_energy, 0.0);
    }

    #[test]
    fn test_endpoint_join() {
        let p = HttpPredictor::new("http://127.0.0.1:7001/", Duration::from_millis(600)).unwrap();
        assert_eq!(p.endpoint(), "http://127.0.0.1:7001/predict");
    }
}
