//! Exploration-rate governor.
//!
//! On every tick the governor compares the rolling violation rate with the
//! target: above target it shrinks epsilon multiplicatively (exploring less
//! while the system is already missing its SLO), otherwise it grows epsilon
//! slowly. Epsilon is always kept within `[epsilon_min, epsilon_max]`.
//!
//! Ticks run on a background task; the request path only performs a relaxed
//! atomic load of the current epsilon.

use std::sync::atomic::{AtomicU64, Ordering};

use super::knobs::ExplorationKnobs;

#[derive(Debug)]
pub struct ExplorationGovernor {
    /// Current epsilon (f64 bits)
    epsilon_bits: AtomicU64,
    min: f64,
    max: f64,
    shrink: f64,
    grow: f64,
}

impl ExplorationGovernor {
    pub fn new(knobs: &ExplorationKnobs) -> Self {
        // max/min instead of clamp: a NaN knob falls back to the bound
        let min = knobs.epsilon_min.max(0.0).min(1.0);
        let max = knobs.epsilon_max.max(min).min(1.0);
        Self {
            epsilon_bits: AtomicU64::new(knobs.epsilon.max(min).min(max).to_bits()),
            min,
            max,
            shrink: knobs.shrink,
            grow: knobs.grow,
        }
    }

    /// Current exploration probability.
    #[inline]
    pub fn epsilon(&self) -> f64 {
        f64::from_bits(self.epsilon_bits.load(Ordering::Relaxed))
    }

    /// Apply one governor step for the observed violation rate and return
    /// the new epsilon.
    pub fn tick(&self, violation_rate: f64, target_rate: f64) -> f64 {
        let eps = self.epsilon();
        let next = if violation_rate > target_rate {
            eps * self.shrink
        } else {
            eps * self.grow
        }
        .max(self.min)
        .min(self.max);
        self.epsilon_bits.store(next.to_bits(), Ordering::Relaxed);
        next
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_epsilon_clamped() {
        let g = ExplorationGovernor::new(&ExplorationKnobs {
            epsilon: 0.9,
            ..Default::default()
        });
        assert!((g.epsilon() - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_shrinks_on_violation_pressure() {
        let g = ExplorationGovernor::new(&ExplorationKnobs::default());
        let e = g.tick(0.5, 0.1);
        assert!((e - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_grows_when_healthy() {
        let g = ExplorationGovernor::new(&ExplorationKnobs::default());
        let e = g.tick(0.0, 0.1);
        assert!((e - 0.105).abs() < 1e-12);
        // Exactly at target counts as healthy
        let e2 = g.tick(0.1, 0.1);
        assert!(e2 > e);
    }

    #[test]
    fn test_never_leaves_bounds() {
        let g = ExplorationGovernor::new(&ExplorationKnobs::default());
        let (min, max) = g.bounds();
        for _ in 0..200 {
            let e = g.tick(1.0, 0.1);
            assert!(e >= min && e <= max);
        }
        assert!((g.epsilon() - min).abs() < 1e-12);
        for _ in 0..500 {
            let e = g.tick(0.0, 0.1);
            assert!(e >= min && e <= max);
        }
        assert!((g.epsilon() - max).abs() < 1e-12);
        // Alternating pressure
        for i in 0..300 {
            let e = g.tick(if i % 3 == 0 { 0.9 } else { 0.0 }, 0.1);
            assert!(e >= min && e <= max);
        }
    }

    #[test]
    fn test_nan_knobs_fall_back_to_bounds() {
        let g = ExplorationGovernor::new(&ExplorationKnobs {
            epsilon: f64::NAN,
            epsilon_min: f64::NAN,
            epsilon_max: 0.3,
            shrink: f64::NAN,
            ..Default::default()
        });
        assert_eq!(g.bounds(), (0.0, 0.3));
        assert_eq!(g.epsilon(), 0.0);
        let e = g.tick(0.9, 0.1);
        assert!((0.0..=0.3).contains(&e));
    }
}
