//! Live get/set of the two dual variables.
//!
//! Operators read and override the SLO risk multiplier (`mu_slo`) and the
//! fairness coefficient (`gamma_fair_ms`) on a running engine. Writes arrive
//! as `application/x-www-form-urlencoded` bodies; each field is parsed on its
//! own, so one malformed field never blocks the other.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::DecisionEngine;

/// Current values of the dual variables.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LagrangeSnapshot {
    pub mu_slo: f64,
    pub gamma_fair_ms: f64,
}

impl LagrangeSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Fields accepted from one write. `None` means absent or unparseable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LagrangeUpdate {
    pub mu_slo: Option<f64>,
    pub gamma_fair_ms: Option<f64>,
}

impl LagrangeUpdate {
    /// Parse a form body such as `mu_slo=1.5&gamma_fair_ms=20`.
    ///
    /// Pairs are percent-decoded first. Non-numeric and non-finite values
    /// are dropped; unknown keys are ignored. The last occurrence of a key
    /// wins.
    pub fn from_form(body: &str) -> Self {
        let mut update = Self::default();
        for (key, value) in form_urlencoded::parse(body.as_bytes()) {
            let Some(value) = parse_number(&value) else {
                continue;
            };
            match key.trim() {
                "mu_slo" => update.mu_slo = Some(value),
                "gamma_fair_ms" => update.gamma_fair_ms = Some(value),
                _ => {}
            }
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        self.mu_slo.is_none() && self.gamma_fair_ms.is_none()
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

impl DecisionEngine {
    /// Read the dual variables.
    pub fn lagrange(&self) -> LagrangeSnapshot {
        LagrangeSnapshot {
            mu_slo: self.slo().mu(),
            gamma_fair_ms: self.fairness().gamma(),
        }
    }

    /// Overwrite whichever dual variables `update` carries. Negative values
    /// clamp to zero. Returns the values after the write.
    pub fn apply_lagrange(&self, update: LagrangeUpdate) -> LagrangeSnapshot {
        if let Some(mu) = update.mu_slo {
            self.slo().set_mu(mu);
        }
        if let Some(gamma) = update.gamma_fair_ms {
            self.fairness().set_gamma(gamma);
        }
        let snapshot = self.lagrange();
        self.metrics()
            .set_lagrange(snapshot.mu_slo, snapshot.gamma_fair_ms);
        if !update.is_empty() {
            info!(
                mu_slo = snapshot.mu_slo,
                gamma_fair_ms = snapshot.gamma_fair_ms,
                "lagrange multipliers updated"
            );
        }
        snapshot
    }

    /// Parse a form body and apply it. See [`LagrangeUpdate::from_form`].
    pub fn apply_lagrange_form(&self, body: &str) -> LagrangeSnapshot {
        self.apply_lagrange(LagrangeUpdate::from_form(body))
    }
}
