//! Builder for constructing decider runtimes.
//!
//! The builder supports multiple configuration sources using figment:
//! - Default values
//! - Config files (TOML, YAML, JSON)
//! - Environment variables
//! - Programmatic overrides
//! - CLI arguments via clap

use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use prometheus::Registry;

use crate::config::{DeciderConfig, ObjectiveKnobs};
use crate::control::{
    BreakerKnobs, CapacityKnobs, DriftKnobs, ExplorationKnobs, FairnessKnobs, QuotaKnobs, SloKnobs,
};
use crate::engine::DecisionEngine;
use crate::error::Result;
use crate::predictor::{HttpPredictor, Predictor};
use crate::runtime::DeciderRuntime;
use crate::telemetry::{HttpTelemetrySink, TelemetrySink};

/// Builder for a [`DeciderRuntime`] or a bare [`DecisionEngine`].
///
/// Configuration sources are merged in the following order (later sources override earlier):
/// 1. Default values
/// 2. Config files (in order added)
/// 3. Environment variables
/// 4. Programmatic overrides
///
/// Without an explicit predictor the builder creates an [`HttpPredictor`]
/// for `predictor.url`; without an explicit sink it creates an
/// [`HttpTelemetrySink`] when `telemetry.url` is set.
///
/// # Examples
///
/// ```ignore
/// use offload_decider::DeciderBuilder;
///
/// let runtime = DeciderBuilder::new()
///     .file("decider.toml")
///     .env_prefix("CSN")
///     .prefix("csn")
///     .build()?;
/// ```
pub struct DeciderBuilder {
    figment: Figment,
    prometheus_registry: Option<Registry>,
    predictor: Option<Arc<dyn Predictor>>,
    telemetry_sink: Option<Arc<dyn TelemetrySink>>,
    capacity_polling: bool,
    telemetry: bool,
}

impl Default for DeciderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeciderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeciderBuilder")
            .field("figment", &self.figment)
            .field(
                "prometheus_registry",
                &self.prometheus_registry.as_ref().map(|_| "<Registry>"),
            )
            .field("predictor", &self.predictor.as_ref().map(|_| "<Predictor>"))
            .field(
                "telemetry_sink",
                &self.telemetry_sink.as_ref().map(|_| "<TelemetrySink>"),
            )
            .field("capacity_polling", &self.capacity_polling)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl DeciderBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(DeciderConfig::default())),
            prometheus_registry: None,
            predictor: None,
            telemetry_sink: None,
            capacity_polling: true,
            telemetry: true,
        }
    }

    /// Add a configuration file.
    ///
    /// Supports TOML, YAML, and JSON formats (detected by extension).
    /// Files are merged in the order they are added.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        self.figment = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => self.figment.merge(Yaml::file(path)),
            "json" => self.figment.merge(Json::file(path)),
            _ => self.figment.merge(Toml::file(path)),
        };
        self
    }

    /// Add environment variables with a prefix.
    ///
    /// Variables are read as `{PREFIX}_{KEY}` for top-level keys and
    /// `{PREFIX}_{SECTION}__{KEY}` for nested ones, e.g. `CSN_SEED`,
    /// `CSN_CAPACITY__COEF`, `CSN_OBJECTIVE__USE_CONFORMAL`.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.figment = self
            .figment
            .merge(Env::prefixed(&format!("{prefix}_")).split("__"));
        self
    }

    fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    /// Set the metric and thread name prefix.
    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        self.set("prefix", prefix.into())
    }

    /// Seed the engine RNG for reproducible decisions.
    pub fn seed(self, seed: u64) -> Self {
        self.set("seed", seed)
    }

    pub fn tokio_threads(self, n: usize) -> Self {
        self.set("tokio_threads", n)
    }

    /// Default whole-decision deadline.
    pub fn request_timeout_ms(self, ms: u64) -> Self {
        self.set("request_timeout_ms", ms)
    }

    pub fn predictor_url(self, url: impl Into<String>) -> Self {
        self.set("predictor.url", url.into())
    }

    pub fn predictor_timeout_ms(self, ms: u64) -> Self {
        self.set("predictor.timeout_ms", ms)
    }

    /// Choose between the conformal p95 and `mean + z * std`.
    pub fn use_conformal(self, enabled: bool) -> Self {
        self.set("objective.use_conformal", enabled)
    }

    pub fn capacity_url(self, url: impl Into<String>) -> Self {
        self.set("capacity.url", url.into())
    }

    pub fn telemetry_url(self, url: impl Into<String>) -> Self {
        self.set("telemetry.url", url.into())
    }

    pub fn objective(self, knobs: ObjectiveKnobs) -> Self {
        self.set("objective", knobs)
    }

    pub fn breaker(self, knobs: BreakerKnobs) -> Self {
        self.set("breaker", knobs)
    }

    pub fn quota(self, knobs: QuotaKnobs) -> Self {
        self.set("quota", knobs)
    }

    pub fn fairness(self, knobs: FairnessKnobs) -> Self {
        self.set("fairness", knobs)
    }

    pub fn slo(self, knobs: SloKnobs) -> Self {
        self.set("slo", knobs)
    }

    /// Set the exploration governor knobs.
    ///
    /// ```ignore
    /// // Deterministic exploitation only
    /// let runtime = DeciderBuilder::new()
    ///     .exploration(ExplorationKnobs::default().fixed(0.0))
    ///     .build()?;
    /// ```
    pub fn exploration(self, knobs: ExplorationKnobs) -> Self {
        self.set("exploration", knobs)
    }

    pub fn capacity(self, knobs: CapacityKnobs) -> Self {
        self.set("capacity", knobs)
    }

    pub fn drift(self, knobs: DriftKnobs) -> Self {
        self.set("drift", knobs)
    }

    /// Never scrape edge capacity; the factor stays at 1.0.
    pub fn disable_capacity_polling(mut self) -> Self {
        self.capacity_polling = false;
        self
    }

    /// Drop all telemetry, including an explicitly supplied sink.
    pub fn disable_telemetry(mut self) -> Self {
        self.telemetry = false;
        self
    }

    /// Use a custom predictor instead of the HTTP client.
    pub fn predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Use a custom telemetry sink instead of the HTTP sink.
    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry_sink = Some(sink);
        self
    }

    /// Provide an external Prometheus registry for metrics exposition.
    pub fn prometheus_registry(mut self, registry: Registry) -> Self {
        self.prometheus_registry = Some(registry);
        self
    }

    /// Apply CLI argument overrides.
    ///
    /// A `--decider-config` file is merged first, then the remaining flags.
    pub fn with_cli_args(mut self, args: &DeciderArgs) -> Self {
        if let Some(ref path) = args.decider_config {
            self = self.file(path);
        }
        if let Some(ref prefix) = args.decider_prefix {
            self = self.prefix(prefix.clone());
        }
        if let Some(ref url) = args.decider_predictor_url {
            self = self.predictor_url(url.clone());
        }
        if let Some(ref url) = args.decider_capacity_url {
            self = self.capacity_url(url.clone());
        }
        if let Some(ref url) = args.decider_telemetry_url {
            self = self.telemetry_url(url.clone());
        }
        if let Some(enabled) = args.decider_use_conformal {
            self = self.use_conformal(enabled);
        }
        if let Some(seed) = args.decider_seed {
            self = self.seed(seed);
        }
        self
    }

    fn into_parts(
        self,
    ) -> Result<(
        DeciderConfig,
        Arc<dyn Predictor>,
        Option<Arc<dyn TelemetrySink>>,
    )> {
        let mut config: DeciderConfig = self.figment.extract().map_err(Box::new)?;
        config.prometheus_registry = self.prometheus_registry;
        if !self.capacity_polling {
            config.capacity.url = None;
        }
        if !self.telemetry {
            config.telemetry.url = None;
        }
        config.validate()?;

        let predictor: Arc<dyn Predictor> = match self.predictor {
            Some(p) => p,
            None => Arc::new(HttpPredictor::new(
                &config.predictor.url,
                config.predictor.timeout(),
            )?),
        };

        let sink: Option<Arc<dyn TelemetrySink>> = if !self.telemetry {
            None
        } else if let Some(sink) = self.telemetry_sink {
            Some(sink)
        } else if let Some(ref url) = config.telemetry.url {
            Some(Arc::new(HttpTelemetrySink::new(url, config.telemetry.timeout())?))
        } else {
            None
        };

        Ok((config, predictor, sink))
    }

    /// Build the runtime and start its background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration extraction or validation fails
    /// - An HTTP client cannot be built
    /// - Runtime construction fails
    pub fn build(self) -> Result<DeciderRuntime> {
        let (config, predictor, sink) = self.into_parts()?;
        DeciderRuntime::from_parts(config, predictor, sink)
    }

    /// Build only the engine, for embedding in an existing tokio runtime.
    ///
    /// Background loops are not started; call
    /// [`DecisionEngine::spawn_background`] to run them.
    pub fn build_engine(self) -> Result<DecisionEngine> {
        let (config, predictor, sink) = self.into_parts()?;
        DecisionEngine::from_parts(config, predictor, sink)
    }
}

/// CLI arguments for decider configuration.
///
/// ```ignore
/// use clap::Parser;
/// use offload_decider::{DeciderArgs, DeciderBuilder};
///
/// #[derive(Parser)]
/// struct MyArgs {
///     #[command(flatten)]
///     decider: DeciderArgs,
/// }
///
/// let args = MyArgs::parse();
/// let runtime = DeciderBuilder::new()
///     .with_cli_args(&args.decider)
///     .build()?;
/// ```
#[derive(Debug, Default, Clone, clap::Args)]
pub struct DeciderArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    pub decider_config: Option<PathBuf>,

    /// Metric and thread name prefix
    #[arg(long)]
    pub decider_prefix: Option<String>,

    /// Predictor base URL
    #[arg(long)]
    pub decider_predictor_url: Option<String>,

    /// Edge capacity metrics URL
    #[arg(long)]
    pub decider_capacity_url: Option<String>,

    /// Telemetry ingestion URL
    #[arg(long)]
    pub decider_telemetry_url: Option<String>,

    /// Use the conformal p95 estimate
    #[arg(long)]
    pub decider_use_conformal: Option<bool>,

    /// RNG seed
    #[arg(long)]
    pub decider_seed: Option<u64>,
}
