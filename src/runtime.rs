//! Process runtime hosting a decision engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    DeciderRuntime                         │
//! │  engine: Arc<DecisionEngine>                              │
//! │  tracker: TaskTracker     cancel: CancellationToken       │
//! └──────────────────────────────────────────────────────────┘
//!          │ spawned on construction
//!          ▼
//! ┌────────────────────────────────────────────┐
//! │  {prefix}-tokio-NNNN workers               │
//! │   governor tick · capacity scrape          │
//! │   drift log · telemetry workers × W        │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Request handlers call [`DeciderRuntime::engine`] and await
//! [`DecisionEngine::decide`] directly; they never go through the tracker.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::DeciderConfig;
use crate::engine::DecisionEngine;
use crate::error::Result;
use crate::predictor::Predictor;
use crate::telemetry::TelemetrySink;

/// Tokio runtime, engine and background tasks with graceful shutdown.
///
/// # Examples
///
/// ```ignore
/// use offload_decider::{Context, DeciderBuilder};
///
/// let runtime = DeciderBuilder::new()
///     .prefix("csn")
///     .env_prefix("CSN")
///     .build()?;
///
/// let decision = runtime.block_on(async {
///     let ctx = Context::for_tenant("acme", 150.0);
///     runtime.engine().decide(&ctx, &["local:low", "edge:med", "cloud:high"]).await
/// });
/// println!("chose {}", decision.action);
///
/// runtime.block_until_idle();
/// ```
pub struct DeciderRuntime {
    engine: Arc<DecisionEngine>,
    tokio_runtime: tokio::runtime::Runtime,
    task_tracker: TaskTracker,
    cancel: CancellationToken,
    tokio_threads: usize,
}

impl DeciderRuntime {
    /// Build the tokio runtime, the engine, and start background tasks.
    ///
    /// Typically called via `DeciderBuilder::build()`.
    pub(crate) fn from_parts(
        config: DeciderConfig,
        predictor: Arc<dyn Predictor>,
        telemetry_sink: Option<Arc<dyn TelemetrySink>>,
    ) -> Result<Self> {
        let tokio_threads = config.effective_tokio_threads();
        info!(
            prefix = %config.prefix,
            tokio_threads,
            predictor = %config.predictor.url,
            capacity_url = ?config.capacity.url,
            telemetry = telemetry_sink.is_some(),
            "building decider runtime"
        );

        let tokio_runtime = Self::build_tokio_runtime(&config.prefix, tokio_threads)?;
        let engine = Arc::new(DecisionEngine::from_parts(config, predictor, telemetry_sink)?);

        let task_tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        engine.spawn_background(tokio_runtime.handle(), &task_tracker, &cancel);

        Ok(Self {
            engine,
            tokio_runtime,
            task_tracker,
            cancel,
            tokio_threads,
        })
    }

    fn build_tokio_runtime(prefix: &str, num_threads: usize) -> Result<tokio::runtime::Runtime> {
        let name_prefix: Arc<str> = prefix.into();
        let thread_counter = Arc::new(AtomicUsize::new(0));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_threads)
            .thread_name_fn(move || {
                let id = thread_counter.fetch_add(1, Ordering::SeqCst);
                format!("{}-tokio-{:04}", name_prefix, id)
            })
            .enable_all()
            .build()?;

        Ok(runtime)
    }

    /// The shared decision engine.
    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &DeciderConfig {
        self.engine.config()
    }

    pub fn tokio_handle(&self) -> &tokio::runtime::Handle {
        self.tokio_runtime.handle()
    }

    pub fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    pub fn tokio_threads(&self) -> usize {
        self.tokio_threads
    }

    /// Block on a future using the tokio runtime.
    pub fn block_on<F: Future>(&self, f: F) -> F::Output {
        self.tokio_runtime.block_on(f)
    }

    /// Spawn a tracked async task.
    ///
    /// The task is awaited by `block_until_idle()`; it is not cancelled by
    /// `shutdown()`, only background loops are.
    #[inline]
    pub fn spawn_async<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.task_tracker
            .spawn_on(future, self.tokio_runtime.handle())
    }

    /// Stop background loops and close the tracker.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.task_tracker.close();
    }

    /// `true` once `shutdown()` was called and every tracked task finished.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.task_tracker.is_closed() && self.task_tracker.is_empty()
    }

    /// Wait for all tracked tasks. Requires `shutdown()` first, otherwise
    /// this waits forever.
    pub async fn wait_for_shutdown(&self) {
        self.task_tracker.wait().await;
    }

    /// Shut down and block until every tracked task has finished.
    pub fn block_until_idle(&self) {
        self.shutdown();
        self.block_on(self.wait_for_shutdown());
    }
}

impl std::fmt::Debug for DeciderRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeciderRuntime")
            .field("engine", &self.engine)
            .field("tasks", &self.task_tracker.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for DeciderRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.engine.config();
        write!(
            f,
            "DeciderRuntime[{}]: tokio({}) predictor={} capacity={} telemetry={}",
            config.prefix,
            self.tokio_threads,
            config.predictor.url,
            config.capacity.url.as_deref().unwrap_or("off"),
            if self.engine.telemetry().is_some() {
                "on"
            } else {
                "off"
            },
        )
    }
}
