//! Distributional drift watcher over an external scalar signal.
//!
//! Running mean and variance use Welford's algorithm. Instead of a true
//! sliding window, the effective count and the squared-deviation sum decay by
//! a fixed factor once the count exceeds the window size. This keeps memory
//! and update cost O(1) at the price of an approximate window.
//!
//! Until a baseline exists the score is 0. The baseline freezes automatically
//! from the running statistics once the warm-up count is passed, or can be
//! set explicitly. After that:
//!
//! ```text
//! score = |mean - baseline_mean| / max(baseline_std, 1e-6)
//! ```

use parking_lot::Mutex;

use super::knobs::DriftKnobs;

const STD_FLOOR: f64 = 1e-6;

/// Point-in-time view of the running statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriftSnapshot {
    pub mean: f64,
    pub std: f64,
    /// Effective (decayed) sample count
    pub n: f64,
    pub score: f64,
    pub baseline: Option<(f64, f64)>,
}

#[derive(Debug, Default)]
struct DriftState {
    n_eff: f64,
    mean: f64,
    m2: f64,
    baseline: Option<(f64, f64)>,
    score: f64,
}

impl DriftState {
    fn std(&self) -> f64 {
        if self.n_eff > 1.0 {
            (self.m2 / (self.n_eff - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
pub struct DriftWatcher {
    state: Mutex<DriftState>,
    window: f64,
    decay: f64,
    warmup: f64,
}

impl DriftWatcher {
    pub fn new(knobs: &DriftKnobs) -> Self {
        Self {
            state: Mutex::new(DriftState::default()),
            window: knobs.window.max(2.0),
            decay: knobs.decay.clamp(0.0, 1.0),
            warmup: knobs.warmup,
        }
    }

    /// Fold one sample in and return the updated drift score.
    pub fn add_sample(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return self.score();
        }
        let mut s = self.state.lock();

        s.n_eff += 1.0;
        let delta = x - s.mean;
        s.mean += delta / s.n_eff;
        s.m2 += delta * (x - s.mean);

        if s.n_eff > self.window {
            s.n_eff *= self.decay;
            s.m2 *= self.decay;
        }

        match s.baseline {
            None => {
                if s.n_eff > self.warmup {
                    let std = s.std().max(STD_FLOOR);
                    s.baseline = Some((s.mean, std));
                }
                s.score = 0.0;
            }
            Some((base_mean, base_std)) => {
                s.score = (s.mean - base_mean).abs() / base_std.max(STD_FLOOR);
            }
        }
        s.score
    }

    /// Replace the baseline explicitly.
    pub fn reset_baseline(&self, mean: f64, std: f64) {
        let mut s = self.state.lock();
        let std = std.max(STD_FLOOR);
        s.baseline = Some((mean, std));
        s.score = (s.mean - mean).abs() / std;
    }

    /// Drop the baseline; the next warm-up will freeze a new one.
    pub fn clear_baseline(&self) {
        let mut s = self.state.lock();
        s.baseline = None;
        s.score = 0.0;
    }

    /// Latest drift score (0 before a baseline exists).
    pub fn score(&self) -> f64 {
        self.state.lock().score
    }

    pub fn baseline(&self) -> Option<(f64, f64)> {
        self.state.lock().baseline
    }

    pub fn current(&self) -> DriftSnapshot {
        let s = self.state.lock();
        DriftSnapshot {
            mean: s.mean,
            std: s.std(),
            n: s.n_eff,
            score: s.score,
            baseline: s.baseline,
        }
    }
}
