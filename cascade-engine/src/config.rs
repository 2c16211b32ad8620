use crate::{
    context::ContextSettings,
    dispatcher::DispatcherSettings,
    error::ConfigError,
    scorer::ScorerSettings,
    store::StoreSettings,
    velocity::VelocitySettings,
};
use cascade_data::{
    adapter::AdapterSettings,
    model::{ExchangeId, symbol::normalise_symbol},
    router::RouterSettings,
};
use cascade_integration::backoff::{ReconnectPolicy, duration_ms};
use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{net::SocketAddr, path::Path, time::Duration};
use tracing::info;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "CASCADE_CONFIG";

/// Per exchange toggle & connection overrides.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub url: Option<String>,
    #[serde(with = "duration_ms", rename = "idle_timeout_ms")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    #[serde(with = "duration_ms", rename = "max_clock_skew_ms")]
    pub max_clock_skew: Duration,
    pub liquidators: Vec<SmolStr>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        let adapter = AdapterSettings::default();
        Self {
            enabled: true,
            url: None,
            idle_timeout: adapter.idle_timeout,
            poll_interval: adapter.poll_interval,
            max_clock_skew: adapter.max_clock_skew,
            liquidators: adapter.liquidators,
        }
    }
}

/// Alert WebSocket server.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    /// Alert broadcast capacity.
    pub buffer_size: usize,
    #[serde(with = "duration_ms", rename = "health_log_interval_ms")]
    pub health_log_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9001".to_string(),
            buffer_size: 10_000,
            health_log_interval: Duration::from_secs(60),
        }
    }
}

/// Complete runtime configuration. Every field has a default, so an empty JSON object is a
/// valid config.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Exchanges without an entry are enabled with default settings.
    pub exchanges: FnvHashMap<ExchangeId, ExchangeConfig>,
    /// Monitored base assets (eg/ "BTC"). Empty monitors every symbol on venues with
    /// all-market streams.
    pub symbols: Vec<SmolStr>,
    pub reconnect: ReconnectPolicy,
    pub router: RouterSettings,
    pub store: StoreSettings,
    pub velocity: VelocitySettings,
    pub scorer: ScorerSettings,
    pub dispatcher: DispatcherSettings,
    pub context: ContextSettings,
    pub server: ServerSettings,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            exchanges: FnvHashMap::default(),
            symbols: vec![SmolStr::new("BTC"), SmolStr::new("ETH"), SmolStr::new("SOL")],
            reconnect: ReconnectPolicy::default(),
            router: RouterSettings::default(),
            store: StoreSettings::default(),
            velocity: VelocitySettings::default(),
            scorer: ScorerSettings::default(),
            dispatcher: DispatcherSettings::default(),
            context: ContextSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl CascadeConfig {
    /// Load the file named by `CASCADE_CONFIG` (defaults if unset), apply environment
    /// overrides & validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            error,
        })?;

        let config = Self::from_json(&contents).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            error,
        })?;

        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Apply the supported environment variable overrides using the provided lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("WS_ADDR") {
            self.server.addr = addr;
        }

        if let Some(value) = lookup("WS_BUFFER_SIZE") {
            self.server.buffer_size = value.trim().parse().map_err(|_| ConfigError::Env {
                key: "WS_BUFFER_SIZE",
                value,
            })?;
        }

        if let Some(value) = lookup("CASCADE_SYMBOLS") {
            self.symbols = value
                .split(',')
                .map(str::trim)
                .filter(|symbol| !symbol.is_empty())
                .map(normalise_symbol)
                .collect();
        }

        if let Some(value) = lookup("CASCADE_COOLDOWN_SECS") {
            let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::Env {
                key: "CASCADE_COOLDOWN_SECS",
                value,
            })?;
            self.dispatcher.cooldown = Duration::from_secs(secs);
        }

        if let Some(value) = lookup("ARCHIVE_PATH") {
            let value = value.trim();
            if value.is_empty() {
                self.store.archive.enabled = false;
            } else {
                self.store.archive.enabled = true;
                self.store.archive.path = Some(value.to_string());
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(reason.into()))
        }

        fn check_url(field: &str, url: Option<&String>) -> Result<(), ConfigError> {
            match url {
                Some(raw) => url::Url::parse(raw)
                    .map(|_| ())
                    .map_err(|error| ConfigError::Invalid(format!("{field}: {error}"))),
                None => Ok(()),
            }
        }

        if self.symbols.iter().any(|symbol| symbol.trim().is_empty()) {
            return invalid("symbols must not contain empty names");
        }

        for (exchange, config) in &self.exchanges {
            check_url(&format!("exchanges.{exchange}.url"), config.url.as_ref())?;
        }
        check_url("context.url", self.context.url.as_ref())?;

        if self.server.addr.parse::<SocketAddr>().is_err() {
            return invalid(format!("server.addr {} is not a socket address", self.server.addr));
        }
        if self.server.buffer_size == 0 {
            return invalid("server.buffer_size must be > 0");
        }
        if self.router.capacity == 0 {
            return invalid("router.capacity must be > 0");
        }

        let hot = &self.store.hot;
        if hot.ring_capacity == 0 || hot.max_symbols == 0 || hot.window_capacity == 0 {
            return invalid("store.hot ring_capacity, max_symbols & window_capacity must be > 0");
        }
        if self.store.warm.bucket_ms == 0 {
            return invalid("store.warm.bucket_ms must be > 0");
        }
        let archive = &self.store.archive;
        if archive.enabled && (archive.queue_capacity == 0 || archive.batch_size == 0) {
            return invalid("store.archive queue_capacity & batch_size must be > 0");
        }

        if self.velocity.windows.is_empty() {
            return invalid("velocity.windows must not be empty");
        }
        for spec in &self.velocity.windows {
            if spec.window_ms == 0 || spec.count_saturation <= 0.0 || spec.notional_saturation <= 0.0
            {
                return invalid(format!(
                    "velocity window {}ms needs a positive length & saturations",
                    spec.window_ms
                ));
            }
        }
        if !self
            .velocity
            .windows
            .iter()
            .map(|spec| spec.window_ms)
            .all_unique()
        {
            return invalid("velocity.windows lengths must be unique");
        }

        let weights = &self.scorer.weights;
        let all = [
            weights.velocity,
            weights.acceleration,
            weights.correlation,
            weights.market,
        ];
        if all.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return invalid("scorer.weights must be finite & non-negative");
        }
        if weights.velocity + weights.acceleration + weights.correlation <= 0.0 {
            return invalid("scorer.weights must not all be zero without market context");
        }
        if !self.scorer.thresholds.is_monotone() {
            return invalid("scorer.thresholds must be strictly increasing within (0, 1]");
        }
        if self.scorer.correlation.saturation_exchanges < 2 {
            return invalid("scorer.correlation.saturation_exchanges must be >= 2");
        }
        if self.scorer.correlation.window_ms == 0 {
            return invalid("scorer.correlation.window_ms must be > 0");
        }

        Ok(())
    }

    /// Exchanges to connect, in tag order.
    pub fn enabled_exchanges(&self) -> Vec<ExchangeId> {
        ExchangeId::ALL
            .into_iter()
            .filter(|exchange| {
                self.exchanges
                    .get(exchange)
                    .is_none_or(|config| config.enabled)
            })
            .collect()
    }

    /// Adapter settings for an exchange, or `None` if it is disabled.
    pub fn adapter_settings(&self, exchange: ExchangeId) -> Option<AdapterSettings> {
        let config = self.exchanges.get(&exchange).cloned().unwrap_or_default();
        if !config.enabled {
            return None;
        }

        Some(AdapterSettings {
            url: config.url,
            reconnect: self.reconnect,
            idle_timeout: config.idle_timeout,
            poll_interval: config.poll_interval,
            max_clock_skew: config.max_clock_skew,
            liquidators: config.liquidators,
            ..AdapterSettings::default()
        })
    }

    /// Symbols market context is polled for.
    pub fn context_symbols(&self) -> Vec<SmolStr> {
        if self.context.symbols.is_empty() {
            self.symbols.clone()
        } else {
            self.context.symbols.clone()
        }
    }
}
