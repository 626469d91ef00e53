//! The decision engine.
//!
//! [`DecisionEngine::decide`] picks one placement out of an ordered list of
//! feasible action identifiers for a request [`Context`]:
//!
//! 1. Per-tenant quota admission. A denied request returns the first
//!    feasible action immediately, without prediction or exploration.
//! 2. Each action, in list order, is predicted (skipped while the breaker is
//!    open or after the deadline) and scored:
//!
//!    ```text
//!    U = -(lat_sample + λE·energy + (α + μ)·max(0, p95 - slo) + cost) + jitter
//!    ```
//!
//!    where `lat_sample` draws from N(mean, min(std, cap)) and edge mean
//!    latency and cost are scaled by the capacity factor.
//! 3. With probability ε, and at least two scored actions, the arg-max is
//!    replaced by a uniformly random other scored action.
//! 4. Nothing scored: first breaker-skipped action, else first feasible.
//! 5. Fairness recheck: a penalized tenant moves to the first other scored
//!    action whose utility beats the penalized chosen utility.
//! 6. The chosen action's violation indicator feeds the SLO controller and
//!    a telemetry event is offered to the queue.
//!
//! Controllers live behind their own locks; the RNG mutex is only held for
//! the synchronous draws, never across a predictor call.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::DeciderConfig;
use crate::context::Context;
use crate::control::{
    CapacityPoller, CircuitBreaker, DriftWatcher, ExplorationGovernor, FairnessTracker,
    QuotaManager, SloController,
};
use crate::error::Result;
use crate::metrics::DeciderMetrics;
use crate::predictor::{PredictionSample, Predictor};
use crate::telemetry::{TelemetryEvent, TelemetryQueue, TelemetrySink};

/// How a decision was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionPath {
    /// Tenant quota exhausted; scoring skipped entirely.
    QuotaDenied,
    /// At least one action was scored.
    Scored,
    /// Nothing could be scored (breaker open, predictor failures, deadline).
    Fallback,
    /// The feasible list was empty.
    Empty,
}

/// Result of one decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Chosen action identifier; empty only for an empty feasible list.
    pub action: String,
    /// The epsilon-greedy override replaced the best-utility action.
    pub explore: bool,
    pub path: DecisionPath,
    /// The fairness recheck moved the decision to another action.
    pub fairness_switched: bool,
    /// Utility of the chosen action when it was scored.
    pub utility: Option<f64>,
    /// Every action scored this round, in list order.
    pub candidates: Vec<ScoredAction>,
}

impl Decision {
    fn unscored(action: String, path: DecisionPath) -> Self {
        Self {
            action,
            explore: false,
            path,
            fairness_switched: false,
            utility: None,
            candidates: Vec::new(),
        }
    }

    /// Typed view of the chosen action.
    pub fn parsed(&self) -> Option<Action> {
        (!self.action.is_empty()).then(|| Action::parse(&self.action))
    }
}

/// One action that received a prediction this round.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredAction {
    /// Position in the feasible list
    pub position: usize,
    pub action: Action,
    /// Prediction after variance flooring
    pub sample: PredictionSample,
    /// Effective p95 used for the SLO penalty
    pub p95_ms: f64,
    pub utility: f64,
}

/// Engine state shared across concurrent requests.
pub struct DecisionEngine {
    config: DeciderConfig,
    predictor: Arc<dyn Predictor>,
    breaker: CircuitBreaker,
    quota: QuotaManager,
    fairness: FairnessTracker,
    slo: SloController,
    governor: ExplorationGovernor,
    capacity: CapacityPoller,
    drift: DriftWatcher,
    telemetry: Option<Arc<TelemetryQueue>>,
    rng: Mutex<SmallRng>,
    metrics: DeciderMetrics,
}

fn gaussian(rng: &mut SmallRng, std: f64) -> f64 {
    if std > 0.0 && std.is_finite() {
        Normal::new(0.0, std).map_or(0.0, |n| n.sample(rng))
    } else {
        0.0
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    // First tick after one full period
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

impl DecisionEngine {
    /// Assemble an engine from a validated configuration.
    ///
    /// Telemetry is disabled when `telemetry_sink` is `None`. Metrics are
    /// registered with `config.prometheus_registry` when present.
    pub fn from_parts(
        config: DeciderConfig,
        predictor: Arc<dyn Predictor>,
        telemetry_sink: Option<Arc<dyn TelemetrySink>>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = DeciderMetrics::with_prefix(&config.prefix);
        if let Some(ref registry) = config.prometheus_registry {
            if let Err(e) = metrics.register(registry) {
                warn!(%e, "failed to register prometheus metrics");
            }
        }

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let telemetry = telemetry_sink.map(|sink| {
            Arc::new(TelemetryQueue::new(
                sink,
                config.telemetry.capacity,
                config.telemetry.timeout(),
                metrics.clone(),
            ))
        });

        let engine = Self {
            predictor,
            breaker: CircuitBreaker::from_knobs(&config.breaker),
            quota: QuotaManager::from_knobs(&config.quota),
            fairness: FairnessTracker::from_knobs(&config.fairness),
            slo: SloController::new(&config.slo),
            governor: ExplorationGovernor::new(&config.exploration),
            capacity: CapacityPoller::new(&config.capacity)?,
            drift: DriftWatcher::new(&config.drift),
            telemetry,
            rng: Mutex::new(rng),
            metrics,
            config,
        };
        engine.refresh_gauges();
        Ok(engine)
    }

    /// Decide with the configured request budget as deadline. All predictor
    /// calls of one decision share that budget.
    pub async fn decide<S: AsRef<str>>(&self, ctx: &Context, feasible: &[S]) -> Decision {
        let deadline = Instant::now() + self.config.request_timeout();
        self.decide_inner(ctx, feasible, deadline).await
    }

    /// Decide within `deadline`, further capped by the configured request
    /// budget. Actions not reached before the deadline are treated as
    /// unavailable.
    pub async fn decide_with_deadline<S: AsRef<str>>(
        &self,
        ctx: &Context,
        feasible: &[S],
        deadline: Instant,
    ) -> Decision {
        let deadline = deadline.min(Instant::now() + self.config.request_timeout());
        self.decide_inner(ctx, feasible, deadline).await
    }

    async fn decide_inner<S: AsRef<str>>(
        &self,
        ctx: &Context,
        feasible: &[S],
        deadline: Instant,
    ) -> Decision {
        self.metrics.decisions_total.inc();
        let tenant = ctx.tenant();

        if !self.quota.allow(tenant, self.config.quota.cost) {
            self.metrics.quota_denials.inc();
            let action = feasible
                .first()
                .map(|a| a.as_ref().to_string())
                .unwrap_or_else(|| self.config.objective.fallback_action.clone());
            debug!(tenant, %action, "quota denied");
            return Decision::unscored(action, DecisionPath::QuotaDenied);
        }

        if feasible.is_empty() {
            return Decision::unscored(String::new(), DecisionPath::Empty);
        }

        let mu = self.slo.mu();
        let cf = self.capacity.factor();
        let per_call = self.config.predictor.timeout();

        let mut scored: Vec<ScoredAction> = Vec::with_capacity(feasible.len());
        let mut best: Option<usize> = None;
        let mut provisional: Option<usize> = None;

        for (position, id) in feasible.iter().enumerate() {
            let id = id.as_ref();
            if !self.breaker.allow() {
                self.metrics.breaker_skips.inc();
                if provisional.is_none() {
                    provisional = Some(position);
                }
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(tenant, remaining = feasible.len() - position, "decision deadline reached");
                break;
            }
            let budget = (deadline - now).min(per_call);

            self.metrics.predictor_calls.inc();
            let sample =
                match tokio::time::timeout(budget, self.predictor.predict(ctx, id)).await {
                    Ok(Ok(sample)) => {
                        self.breaker.on_success();
                        sample
                    }
                    Ok(Err(e)) => {
                        self.metrics.predictor_failures.inc();
                        self.breaker.on_failure();
                        debug!(%e, action = id, "predictor call failed");
                        continue;
                    }
                    Err(_) => {
                        self.metrics.predictor_failures.inc();
                        self.breaker.on_failure();
                        debug!(action = id, ?budget, "predictor call timed out");
                        continue;
                    }
                };

            let entry = self.score(ctx, position, Action::parse(id), sample, mu, cf);
            // Strict comparison: ties keep the earliest action
            if best.map_or(true, |b| entry.utility > scored[b].utility) {
                best = Some(scored.len());
            }
            scored.push(entry);
        }

        let mut explore = false;
        if let Some(b) = best {
            if scored.len() >= 2 {
                let epsilon = self.governor.epsilon();
                let mut rng = self.rng.lock();
                if rng.gen::<f64>() < epsilon {
                    let mut alt = rng.gen_range(0..scored.len() - 1);
                    if alt >= b {
                        alt += 1;
                    }
                    best = Some(alt);
                    explore = true;
                }
            }
        }

        let (mut chosen_pos, path) = match best {
            Some(b) => (scored[b].position, DecisionPath::Scored),
            None => {
                self.metrics.fallback_decisions.inc();
                (provisional.unwrap_or(0), DecisionPath::Fallback)
            }
        };

        let chosen_action = Action::parse(feasible[chosen_pos].as_ref());
        let penalty = self
            .fairness
            .observe(tenant, chosen_action.resource_intensity());
        let mut fairness_switched = false;
        if penalty > 0.0 && scored.len() > 1 {
            if let Some(b) = best {
                let penalized = scored[b].utility - penalty;
                // First better alternative in list order, not the best one
                if let Some(alt) = scored
                    .iter()
                    .position(|s| s.position != chosen_pos && s.utility > penalized)
                {
                    best = Some(alt);
                    chosen_pos = scored[alt].position;
                    fairness_switched = true;
                    self.metrics.fairness_switches.inc();
                }
            }
        }

        let chosen = best.map(|b| &scored[b]);
        if let Some(entry) = chosen {
            let violated = entry.p95_ms > ctx.slo_p95_ms;
            let mu = self.slo.record(violated);
            self.metrics.mu_slo.set(mu);
            self.metrics.viol_rate.set(self.slo.violation_rate());

            if self.config.drift.feed_from_decisions {
                let score = self.drift.add_sample(entry.sample.mu_latency_ms);
                self.metrics.set_drift(score, self.drift.current().n);
            }
        }

        let action = feasible[chosen_pos].as_ref().to_string();
        if let Some(ref queue) = self.telemetry {
            queue.offer(TelemetryEvent::new(ctx, &action, chosen.map(|e| &e.sample)));
        }
        let utility = chosen.map(|e| e.utility);

        if explore {
            self.metrics.explore_decisions.inc();
        }
        debug!(
            tenant,
            %action,
            explore,
            fairness_switched,
            scored = scored.len(),
            ?path,
            "decision"
        );

        Decision {
            action,
            explore,
            path,
            fairness_switched,
            utility,
            candidates: scored,
        }
    }

    /// Score one predicted action. Draws latency noise and jitter from the
    /// engine RNG.
    fn score(
        &self,
        ctx: &Context,
        position: usize,
        action: Action,
        sample: PredictionSample,
        mu: f64,
        capacity_factor: f64,
    ) -> ScoredAction {
        let obj = &self.config.objective;
        let sample = sample.floored(obj.variance_floor);
        let std = sample.latency_std();

        let mean = if action.is_edge() {
            sample.mu_latency_ms * capacity_factor
        } else {
            sample.mu_latency_ms
        };

        let (noise, jitter) = {
            let mut rng = self.rng.lock();
            (
                gaussian(&mut rng, std.min(obj.explore_std_cap)),
                gaussian(&mut rng, obj.jitter_std),
            )
        };
        let latency_sample = mean + noise;

        let p95_ms = if obj.use_conformal {
            sample.p95_conformal_ms
        } else {
            mean + obj.p95_z * std
        };
        let slo_penalty = (p95_ms - ctx.slo_p95_ms).max(0.0);
        let cost = action.cost_ms_with_capacity(capacity_factor);

        let utility = -(latency_sample
            + obj.lambda_energy * sample.mu_energy_j
            + (obj.alpha_slo_base + mu) * slo_penalty
            + cost)
            + jitter;

        ScoredAction {
            position,
            action,
            sample,
            p95_ms,
            utility,
        }
    }

    /// Feed an external scalar into the drift watcher.
    pub fn observe_signal(&self, value: f64) -> f64 {
        let score = self.drift.add_sample(value);
        self.metrics.set_drift(score, self.drift.current().n);
        score
    }

    /// Publish every controller-owned gauge.
    pub(crate) fn refresh_gauges(&self) {
        self.metrics
            .set_lagrange(self.slo.mu(), self.fairness.gamma());
        self.metrics.explore_epsilon.set(self.governor.epsilon());
        self.metrics.viol_rate.set(self.slo.violation_rate());
        self.metrics
            .set_capacity(self.capacity.factor(), self.capacity.edges_up());
        let drift = self.drift.current();
        self.metrics.set_drift(drift.score, drift.n);
    }

    /// Start the background loops on `handle`, tracked by `tracker` and
    /// stopped by `cancel`: exploration governor, capacity poller (when a
    /// source is configured), drift log ticker and telemetry workers.
    pub fn spawn_background(
        self: &Arc<Self>,
        handle: &Handle,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
    ) {
        tracker.spawn_on(self.clone().governor_loop(cancel.clone()), handle);
        if self.capacity.has_source() {
            tracker.spawn_on(self.clone().capacity_loop(cancel.clone()), handle);
        }
        tracker.spawn_on(self.clone().drift_log_loop(cancel.clone()), handle);

        let mut workers = 0;
        if let Some(ref queue) = self.telemetry {
            workers = self.config.telemetry.workers;
            for _ in 0..workers {
                tracker.spawn_on(queue.clone().run_worker(cancel.clone()), handle);
            }
        }

        info!(
            prefix = %self.config.prefix,
            capacity_polling = self.capacity.has_source(),
            telemetry_workers = workers,
            "background tasks started"
        );
    }

    async fn governor_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = ticker(self.config.exploration.interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let rate = self.slo.violation_rate();
            let epsilon = self.governor.tick(rate, self.slo.target_rate());
            self.metrics.explore_epsilon.set(epsilon);
            self.metrics.viol_rate.set(rate);
            self.metrics.mu_slo.set(self.slo.mu());
            debug!(rate, epsilon, "exploration governor tick");
        }
    }

    async fn capacity_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = ticker(self.config.capacity.interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.capacity.poll_once() => polled,
            };
            if let Some(factor) = polled {
                let edges_up = self.capacity.edges_up();
                self.metrics.set_capacity(factor, edges_up);
                debug!(factor, edges_up, "capacity refreshed");
            }
        }
    }

    async fn drift_log_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = ticker(self.config.drift.log_interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let snap = self.drift.current();
            self.metrics.set_drift(snap.score, snap.n);
            debug!(
                mean = snap.mean,
                std = snap.std,
                n = snap.n,
                score = snap.score,
                "drift"
            );
        }
    }

    pub fn config(&self) -> &DeciderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DeciderMetrics {
        &self.metrics
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn quota(&self) -> &QuotaManager {
        &self.quota
    }

    pub fn fairness(&self) -> &FairnessTracker {
        &self.fairness
    }

    pub fn slo(&self) -> &SloController {
        &self.slo
    }

    pub fn governor(&self) -> &ExplorationGovernor {
        &self.governor
    }

    pub fn capacity(&self) -> &CapacityPoller {
        &self.capacity
    }

    pub fn drift(&self) -> &DriftWatcher {
        &self.drift
    }

    /// Telemetry queue, when telemetry is enabled.
    pub fn telemetry(&self) -> Option<&Arc<TelemetryQueue>> {
        self.telemetry.as_ref()
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("prefix", &self.config.prefix)
            .field("breaker_open", &self.breaker.is_open())
            .field("mu_slo", &self.slo.mu())
            .field("epsilon", &self.governor.epsilon())
            .field("capacity_factor", &self.capacity.factor())
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}
