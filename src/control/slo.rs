//! Primal-dual SLO risk controller.
//!
//! A fixed-length ring of 0/1 violation indicators tracks the recent
//! violation rate. The risk multiplier `mu` moves by projected subgradient
//! ascent toward the target rate:
//!
//! ```text
//! mu <- max(0, mu + eta * (rate - target))
//! ```
//!
//! at most once per `update_every`. The engine adds `mu` to its base SLO
//! penalty weight, so a persistently high violation rate makes scoring more
//! risk-averse and a persistently low one relaxes it back toward zero.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::knobs::SloKnobs;

struct SloState {
    /// Ring of violation indicators; length fixed at construction
    window: Vec<u8>,
    cursor: usize,
    mu: f64,
    last_update: Instant,
}

impl SloState {
    fn rate(&self) -> f64 {
        let sum: u32 = self.window.iter().map(|&v| v as u32).sum();
        sum as f64 / self.window.len() as f64
    }
}

/// Violation window plus dual variable, guarded by one mutex.
pub struct SloController {
    state: Mutex<SloState>,
    target_rate: f64,
    eta: f64,
    update_every: Duration,
}

impl SloController {
    pub fn new(knobs: &SloKnobs) -> Self {
        Self::new_at(knobs, Instant::now())
    }

    pub(crate) fn new_at(knobs: &SloKnobs, now: Instant) -> Self {
        Self {
            state: Mutex::new(SloState {
                window: vec![0; knobs.window.max(1)],
                cursor: 0,
                mu: knobs.initial_mu.max(0.0),
                last_update: now,
            }),
            target_rate: knobs.target_rate,
            eta: knobs.eta,
            update_every: knobs.update_every(),
        }
    }

    /// Record the outcome of one decision and, if the update interval has
    /// elapsed, take one dual ascent step. Returns the multiplier afterwards.
    pub fn record(&self, violated: bool) -> f64 {
        self.record_at(violated, Instant::now())
    }

    pub(crate) fn record_at(&self, violated: bool, now: Instant) -> f64 {
        let mut s = self.state.lock();
        let len = s.window.len();
        let idx = s.cursor % len;
        s.window[idx] = violated as u8;
        s.cursor = s.cursor.wrapping_add(1);

        if now.saturating_duration_since(s.last_update) >= self.update_every {
            let rate = s.rate();
            s.mu = (s.mu + self.eta * (rate - self.target_rate)).max(0.0);
            s.last_update = now;
        }
        s.mu
    }

    /// Mean of the violation window (unfilled slots count as 0).
    pub fn violation_rate(&self) -> f64 {
        self.state.lock().rate()
    }

    pub fn mu(&self) -> f64 {
        self.state.lock().mu
    }

    /// Overwrite the multiplier. Negative values clamp to zero.
    pub fn set_mu(&self, mu: f64) {
        self.state.lock().mu = mu.max(0.0);
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn window_len(&self) -> usize {
        self.state.lock().window.len()
    }
}

impl std::fmt::Debug for SloController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.lock();
        f.debug_struct("SloController")
            .field("mu", &s.mu)
            .field("violation_rate", &s.rate())
            .field("target_rate", &self.target_rate)
            .field("window", &s.window.len())
            .finish()
    }
}
