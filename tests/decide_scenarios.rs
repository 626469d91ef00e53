//! End-to-end decision scenarios against stub predictors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use offload_decider::control::ExplorationKnobs;
use offload_decider::{
    Context, DeciderConfig, DecisionEngine, DecisionPath, MemoryTelemetrySink, PredictionSample,
    Predictor, PredictorError,
};

/// Fixed prediction per action id; unknown ids fail.
#[derive(Default)]
struct TablePredictor {
    table: HashMap<String, PredictionSample>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl TablePredictor {
    fn with(mut self, action: &str, mu_latency_ms: f64) -> Self {
        self.table.insert(
            action.to_string(),
            PredictionSample {
                mu_latency_ms,
                var_latency: 1.0,
                mu_energy_j: 0.0,
                var_energy: 0.0,
                p95_conformal_ms: mu_latency_ms + 5.0,
            },
        );
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Predictor for TablePredictor {
    fn predict<'a>(
        &'a self,
        _ctx: &'a Context,
        action: &'a str,
    ) -> BoxFuture<'a, Result<PredictionSample, PredictorError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.table
                .get(action)
                .copied()
                .ok_or_else(|| PredictorError::Unavailable(action.to_string()))
        })
    }
}

/// No noise, no exploration, generous quota, no network.
fn quiet_config() -> DeciderConfig {
    let mut config = DeciderConfig::offline();
    config.seed = Some(11);
    config.objective.jitter_std = 0.0;
    config.objective.explore_std_cap = 0.0;
    config.exploration = ExplorationKnobs::default().fixed(0.0);
    config.quota.burst = 100_000.0;
    config
}

fn engine(config: DeciderConfig, predictor: Arc<TablePredictor>) -> DecisionEngine {
    DecisionEngine::from_parts(config, predictor, None).unwrap()
}

#[tokio::test]
async fn test_single_candidate_never_explores() {
    let predictor = Arc::new(TablePredictor::default().with("local:low", 30.0));
    // Default noise and exploration on purpose
    let mut config = DeciderConfig::offline();
    config.seed = Some(5);
    config.exploration.epsilon = 0.2;
    let e = engine(config, predictor.clone());

    let ctx = Context::for_tenant("t", 100.0);
    for _ in 0..50 {
        let d = e.decide(&ctx, &["local:low"]).await;
        assert_eq!(d.action, "local:low");
        assert!(!d.explore);
        assert_eq!(d.path, DecisionPath::Scored);
    }
    assert_eq!(predictor.calls(), 50);
}

#[tokio::test]
async fn test_exhausted_quota_skips_predictor() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("edge:med", 10.0)
            .with("local:low", 30.0),
    );
    let mut config = quiet_config();
    config.quota.rate = 0.0;
    config.quota.burst = 1.0;
    let e = engine(config, predictor.clone());

    assert!(e.quota().allow("t", 1.0));
    assert!(!e.quota().allow("t", 1.0));

    let ctx = Context::for_tenant("t", 100.0);
    let d = e.decide(&ctx, &["edge:med", "local:low"]).await;
    assert_eq!(d.action, "edge:med");
    assert!(!d.explore);
    assert_eq!(d.path, DecisionPath::QuotaDenied);
    assert_eq!(predictor.calls(), 0);

    // Other tenants are unaffected
    let other = Context::for_tenant("u", 100.0);
    let d = e.decide(&other, &["edge:med", "local:low"]).await;
    assert_eq!(d.path, DecisionPath::Scored);
}

#[tokio::test]
async fn test_open_breaker_returns_first_feasible() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("cloud:high", 5.0)
            .with("edge:low", 5.0)
            .with("local:low", 5.0),
    );
    let e = engine(quiet_config(), predictor.clone());
    e.breaker().force_open(Duration::from_secs(600));

    let lists: [&[&str]; 3] = [
        &["edge:low", "local:low", "cloud:high"],
        &["cloud:high", "edge:low"],
        &["local:low"],
    ];
    let ctx = Context::for_tenant("t", 100.0);
    for i in 0..100 {
        let list = lists[i % lists.len()];
        let d = e.decide(&ctx, list).await;
        assert_eq!(d.action, list[0]);
        assert!(!d.explore);
        assert_eq!(d.path, DecisionPath::Fallback);
    }
    assert_eq!(predictor.calls(), 0);
    assert!(e.metrics().breaker_skips.get() >= 100);
}

#[tokio::test]
async fn test_failures_open_breaker() {
    // Predictor knows nothing: every call fails
    let predictor = Arc::new(TablePredictor::default());
    let e = engine(quiet_config(), predictor.clone());
    let ctx = Context::for_tenant("t", 100.0);

    let d = e.decide(&ctx, &["edge:low", "local:low"]).await;
    assert_eq!(d.action, "edge:low");
    assert_eq!(d.path, DecisionPath::Fallback);
    assert_eq!(predictor.calls(), 2);

    // Three more failures reach the threshold of 5
    e.decide(&ctx, &["edge:low", "local:low", "cloud:low"]).await;
    assert!(e.breaker().is_open());
    assert_eq!(predictor.calls(), 5);

    let d = e.decide(&ctx, &["cloud:low", "edge:low"]).await;
    assert_eq!(d.action, "cloud:low");
    assert_eq!(predictor.calls(), 5);
}

#[tokio::test]
async fn test_fairness_shifts_heavy_tenant_to_lighter_actions() {
    // Without fairness cloud:high wins: -(10 + 160) > -(190 + 0)
    let table = || {
        TablePredictor::default()
            .with("cloud:high", 10.0)
            .with("local:low", 190.0)
    };
    let heavy_list = ["cloud:high", "local:low"];
    let light_list = ["local:low"];
    let light = Context::for_tenant("light", 1_000.0);
    let heavy = Context::for_tenant("heavy", 1_000.0);

    let run = |gamma: f64| {
        let mut config = quiet_config();
        config.fairness.gamma_ms = gamma;
        let e = engine(config, Arc::new(table()));
        let light = light.clone();
        let heavy = heavy.clone();
        async move {
            let mut heavy_low = 0;
            let mut light_low = 0;
            for _ in 0..200 {
                if e.decide(&light, &light_list).await.action == "local:low" {
                    light_low += 1;
                }
                if e.decide(&heavy, &heavy_list).await.action == "local:low" {
                    heavy_low += 1;
                }
            }
            (heavy_low, light_low, e.metrics().fairness_switches.get())
        }
    };

    let (heavy_low_off, light_low_off, switches_off) = run(0.0).await;
    let (heavy_low_on, light_low_on, switches_on) = run(50.0).await;

    assert_eq!(light_low_off, 200);
    assert_eq!(light_low_on, 200);
    assert_eq!(heavy_low_off, 0);
    assert_eq!(switches_off, 0);
    assert!(
        heavy_low_on >= 190,
        "heavy tenant moved to local:low only {heavy_low_on}/200 times"
    );
    assert_eq!(switches_on as usize, heavy_low_on);
}

/// The fairness recheck takes the first alternative that beats the
/// penalized utility in list order, even when a later one scores higher.
#[tokio::test]
async fn test_fairness_picks_first_better_alternative_not_best() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("local:med", 180.0) // U = -220
            .with("cloud:high", 10.0) // U = -170
            .with("local:low", 175.0), // U = -175
    );
    let mut config = quiet_config();
    config.fairness.gamma_ms = 50.0;
    let e = engine(config, predictor);

    e.decide(&Context::for_tenant("light", 1_000.0), &["local:low"])
        .await;
    let d = e
        .decide(
            &Context::for_tenant("heavy", 1_000.0),
            &["local:med", "cloud:high", "local:low"],
        )
        .await;

    assert!(d.fairness_switched);
    assert_eq!(d.action, "local:med");
    let utility = |pos: usize| {
        d.candidates
            .iter()
            .find(|c| c.position == pos)
            .map(|c| c.utility)
            .unwrap()
    };
    // local:low would have been the better reassignment
    assert!(utility(2) > utility(0));
    assert_eq!(d.utility, Some(utility(0)));
}

#[tokio::test]
async fn test_violations_raise_mu() {
    let predictor = Arc::new(TablePredictor::default().with("edge:low", 50.0));
    let mut config = quiet_config();
    config.slo.update_every_ms = 0;
    config.slo.window = 10;
    let e = engine(config, predictor);

    // p95 55ms against a 20ms budget: every decision violates
    let ctx = Context::for_tenant("t", 20.0);
    let mut prev = e.slo().mu();
    for _ in 0..30 {
        e.decide(&ctx, &["edge:low"]).await;
        let mu = e.slo().mu();
        assert!(mu >= prev);
        prev = mu;
    }
    assert!(prev > 0.0);
    assert!((e.slo().violation_rate() - 1.0).abs() < 1e-12);
    assert!((e.metrics().mu_slo.get() - prev).abs() < 1e-9);

    // Lagrange write overrides the learned value
    e.apply_lagrange_form("mu_slo=0");
    assert_eq!(e.lagrange().mu_slo, 0.0);
}

#[tokio::test]
async fn test_capacity_factor_favors_edge() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("edge:low", 100.0)
            .with("local:low", 70.0),
    );
    let e = engine(quiet_config(), predictor);
    let ctx = Context::for_tenant("t", 1_000.0);

    let d = e.decide(&ctx, &["edge:low", "local:low"]).await;
    assert_eq!(d.action, "local:low");

    e.capacity().ingest_text("# TYPE csn_edges_up gauge\ncsn_edges_up 5\n");
    assert!((e.capacity().factor() - 0.4).abs() < 1e-9);
    let d = e.decide(&ctx, &["edge:low", "local:low"]).await;
    assert_eq!(d.action, "edge:low");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_evaluation() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("edge:low", 10.0)
            .with("edge:med", 10.0)
            .with("cloud:low", 10.0)
            .with("local:low", 10.0)
            .delayed(Duration::from_millis(50)),
    );
    let e = engine(quiet_config(), predictor.clone());
    let ctx = Context::for_tenant("t", 1_000.0);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(120);
    let d = e
        .decide_with_deadline(
            &ctx,
            &["edge:low", "edge:med", "cloud:low", "local:low"],
            deadline,
        )
        .await;

    // Two answers in time, the third cut off at the deadline, the fourth never tried
    assert_eq!(d.candidates.len(), 2);
    assert_eq!(predictor.calls(), 3);
    assert_eq!(d.action, "edge:low");
    assert_eq!(e.metrics().predictor_failures.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_predictor_budget_bounds_whole_decision() {
    let actions = ["edge:low", "edge:med", "cloud:low", "cloud:med", "local:low"];
    let table = || {
        actions
            .iter()
            .fold(TablePredictor::default(), |p, a| p.with(a, 10.0))
            .delayed(Duration::from_millis(550))
    };
    let ctx = Context::for_tenant("t", 1_000.0);

    // Default: the 600ms predictor budget covers every call of the decision
    let predictor = Arc::new(table());
    let e = engine(quiet_config(), predictor.clone());
    let start = tokio::time::Instant::now();
    let d = e.decide(&ctx, &actions).await;
    assert!(start.elapsed() <= Duration::from_millis(600), "{:?}", start.elapsed());
    assert_eq!(d.candidates.len(), 1);
    assert_eq!(d.action, "edge:low");
    assert_eq!(predictor.calls(), 2);

    // An explicit request budget widens the window, per-call timeout still applies
    let predictor = Arc::new(table());
    let mut config = quiet_config();
    config.request_timeout_ms = Some(2_000);
    let e = engine(config, predictor.clone());
    let start = tokio::time::Instant::now();
    let d = e.decide(&ctx, &actions).await;
    assert!(start.elapsed() <= Duration::from_millis(2_000));
    assert_eq!(d.candidates.len(), 3);
    assert_eq!(predictor.calls(), 4);

    // A caller deadline beyond the budget is capped
    let predictor = Arc::new(table());
    let e = engine(quiet_config(), predictor.clone());
    let start = tokio::time::Instant::now();
    e.decide_with_deadline(&ctx, &actions, start + Duration::from_secs(10))
        .await;
    assert!(start.elapsed() <= Duration::from_millis(600));
    assert_eq!(predictor.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_predictor_times_out() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("edge:low", 10.0)
            .delayed(Duration::from_secs(2)),
    );
    let e = engine(quiet_config(), predictor);
    let d = e
        .decide(&Context::for_tenant("t", 100.0), &["edge:low"])
        .await;
    assert_eq!(d.path, DecisionPath::Fallback);
    assert_eq!(d.action, "edge:low");
    assert_eq!(e.breaker().failure_count(), 1);
}

#[tokio::test]
async fn test_telemetry_drops_when_full() {
    let predictor = Arc::new(TablePredictor::default().with("local:low", 30.0));
    let sink = Arc::new(MemoryTelemetrySink::new());
    let mut config = quiet_config();
    config.telemetry.capacity = 2;
    let e = DecisionEngine::from_parts(config, predictor, Some(sink.clone())).unwrap();

    let ctx = Context::for_tenant("t", 100.0);
    for _ in 0..5 {
        let d = e.decide(&ctx, &["local:low"]).await;
        assert_eq!(d.action, "local:low");
    }
    assert_eq!(e.metrics().telemetry_dropped.get(), 3);

    let queue = e.telemetry().unwrap();
    assert_eq!(queue.drain().await, 2);
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tenant_id, "t");
    assert_eq!(events[0].action, "local:low");
    assert_eq!(events[0].lat_mu, Some(30.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decisions() {
    let predictor = Arc::new(
        TablePredictor::default()
            .with("edge:low", 20.0)
            .with("local:low", 40.0)
            .with("cloud:med", 15.0),
    );
    let mut config = DeciderConfig::offline();
    config.seed = Some(99);
    config.quota.burst = 100_000.0;
    let e = Arc::new(DecisionEngine::from_parts(config, predictor.clone(), None).unwrap());

    let mut handles = Vec::new();
    for t in 0..8 {
        let e = e.clone();
        handles.push(tokio::spawn(async move {
            let ctx = Context::for_tenant(format!("tenant-{t}"), 100.0);
            for _ in 0..50 {
                let d = e
                    .decide(&ctx, &["edge:low", "local:low", "cloud:med"])
                    .await;
                assert!(!d.action.is_empty());
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(e.metrics().decisions_total.get(), 400);
    assert_eq!(predictor.calls(), 1_200);
}
