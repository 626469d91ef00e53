//! Best-effort telemetry for decisions.
//!
//! Every decision offers one [`TelemetryEvent`] to a bounded lock-free queue.
//! A fixed pool of worker tasks drains the queue into a [`TelemetrySink`].
//! When the queue is full the event is dropped and counted; the decision
//! path never waits on delivery, and failed deliveries are never retried.
//!
//! ```text
//! decide() ──offer──▶ ArrayQueue (capacity N) ──pop──▶ worker × W ──▶ sink
//!              │                                          │
//!              └─ full: drop + telemetry_dropped          └─ error: telemetry_failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::Context;
use crate::error::{DeciderError, TelemetryError};
use crate::metrics::DeciderMetrics;
use crate::predictor::PredictionSample;

/// Sensing event describing one request context and the chosen action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub tenant_id: String,
    pub app_id: String,
    pub bw_mbps: f64,
    pub rtt_ms: f64,
    pub loss: f64,
    pub device_cpu: f64,
    pub battery_soc: f64,
    pub edge_cpu: f64,
    pub input_kb: f64,
    pub slo_p95_ms: f64,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_mu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_var: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en_mu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_conf: Option<f64>,
}

impl TelemetryEvent {
    /// Build an event; `prediction` is the chosen action's sample when it
    /// was scored this round.
    pub fn new(ctx: &Context, action: &str, prediction: Option<&PredictionSample>) -> Self {
        Self {
            tenant_id: ctx.tenant().to_string(),
            app_id: ctx.app_id.clone(),
            bw_mbps: ctx.bw_mbps,
            rtt_ms: ctx.rtt_ms,
            loss: ctx.loss,
            device_cpu: ctx.device_cpu,
            battery_soc: ctx.battery_soc,
            edge_cpu: ctx.edge_cpu,
            input_kb: ctx.input_kb,
            slo_p95_ms: ctx.slo_p95_ms,
            action: action.to_string(),
            lat_mu: prediction.map(|p| p.mu_latency_ms),
            lat_var: prediction.map(|p| p.var_latency),
            en_mu: prediction.map(|p| p.mu_energy_j),
            p95_conf: prediction.map(|p| p.p95_conformal_ms),
        }
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn send<'a>(&'a self, event: &'a TelemetryEvent) -> BoxFuture<'a, Result<(), TelemetryError>>;
}

/// Posts events as JSON to an ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    url: String,
}

impl HttpTelemetrySink {
    pub fn new(url: &str, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeciderError::HttpClient)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySink for HttpTelemetrySink {
    fn send<'a>(&'a self, event: &'a TelemetryEvent) -> BoxFuture<'a, Result<(), TelemetryError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.url)
                .json(event)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TelemetryError::Timeout
                    } else {
                        TelemetryError::Transport(e)
                    }
                })?;
            if !resp.status().is_success() {
                return Err(TelemetryError::Status(resp.status().as_u16()));
            }
            Ok(())
        })
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TelemetrySink for MemoryTelemetrySink {
    fn send<'a>(&'a self, event: &'a TelemetryEvent) -> BoxFuture<'a, Result<(), TelemetryError>> {
        self.events.lock().push(event.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Bounded queue in front of a sink, drained by worker tasks.
pub struct TelemetryQueue {
    queue: ArrayQueue<TelemetryEvent>,
    notify: Notify,
    sink: Arc<dyn TelemetrySink>,
    timeout: Duration,
    metrics: DeciderMetrics,
}

impl TelemetryQueue {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        capacity: usize,
        timeout: Duration,
        metrics: DeciderMetrics,
    ) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            notify: Notify::new(),
            sink,
            timeout,
            metrics,
        }
    }

    /// Enqueue without waiting. Returns `false` if the event was dropped.
    pub fn offer(&self, event: TelemetryEvent) -> bool {
        match self.queue.push(event) {
            Ok(()) => {
                self.notify.notify_one();
                true
            }
            Err(event) => {
                self.metrics.telemetry_dropped.inc();
                debug!(tenant = %event.tenant_id, action = %event.action, "telemetry queue full, event dropped");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Deliver everything currently queued. Returns the number of events
    /// popped (delivered or failed).
    pub async fn drain(&self) -> usize {
        let mut n = 0;
        while let Some(event) = self.queue.pop() {
            self.deliver(&event).await;
            n += 1;
        }
        n
    }

    /// Worker loop: drain, then park until new events or cancellation.
    pub async fn run_worker(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.drain().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn deliver(&self, event: &TelemetryEvent) {
        match tokio::time::timeout(self.timeout, self.sink.send(event)).await {
            Ok(Ok(())) => self.metrics.telemetry_sent.inc(),
            Ok(Err(e)) => {
                self.metrics.telemetry_failed.inc();
                debug!(%e, tenant = %event.tenant_id, "telemetry delivery failed");
            }
            Err(_) => {
                self.metrics.telemetry_failed.inc();
                debug!(tenant = %event.tenant_id, "telemetry delivery timed out");
            }
        }
    }
}

impl std::fmt::Debug for TelemetryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryQueue")
            .field("len", &self.queue.len())
            .field("capacity", &self.queue.capacity())
            .field("timeout", &self.timeout)
            .finish()
    }
}
