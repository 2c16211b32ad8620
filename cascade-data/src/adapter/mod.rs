use crate::{
    adapter::{health::AdapterHealth, poll::PollAdapter, ws::WsAdapter},
    error::DataError,
    exchange::{
        binance::BinanceFuturesUsd, bitmex::Bitmex, bybit::BybitPerpetualsUsd, dydx::DydxV4,
        hyperliquid::Hyperliquid, okx::Okx,
    },
    model::{ExchangeId, event::Ingested, symbol::SymbolTable},
    shutdown::Shutdown,
    streams::timeout::DEFAULT_READ_TIMEOUT,
};
use cascade_integration::backoff::{ReconnectPolicy, duration_ms};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};

/// Lock-free per adapter health counters.
pub mod health;

/// Venue agnostic [`RawLiquidation`](crate::exchange::RawLiquidation) normalisation.
pub mod normalise;

/// REST polling adapter driving a [`Poller`](poll::Poller).
pub mod poll;

/// Reconnecting WebSocket adapter driving a [`Connector`](crate::exchange::Connector).
pub mod ws;

/// Default capacity of the channel between an adapter & the router.
pub const DEFAULT_ADAPTER_CHANNEL_CAPACITY: usize = 4096;

/// Default REST poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default tolerance for liquidation timestamps ahead of the local receive time.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(10);

/// Per adapter runtime settings.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Override of the venue's default endpoint.
    pub url: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Connection is considered dead if nothing is received for this long.
    #[serde(with = "duration_ms", rename = "idle_timeout_ms")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    pub channel_capacity: usize,
    pub malformed_warn_every: u64,
    /// Liquidations stamped further than this ahead of their receive time are malformed.
    #[serde(with = "duration_ms", rename = "max_clock_skew_ms")]
    pub max_clock_skew: Duration,
    /// Liquidator addresses for on-chain venues. Empty uses the venue default.
    pub liquidators: Vec<SmolStr>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            url: None,
            reconnect: ReconnectPolicy::default(),
            idle_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_ADAPTER_CHANNEL_CAPACITY,
            malformed_warn_every: health::DEFAULT_MALFORMED_WARN_EVERY,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            liquidators: Vec::new(),
        }
    }
}

/// Running adapter: its event stream, shared health counters & task handle.
#[derive(Debug)]
pub struct AdapterStream {
    pub exchange: ExchangeId,
    pub events: mpsc::Receiver<Ingested>,
    pub health: Arc<AdapterHealth>,
    pub task: JoinHandle<()>,
}

/// A venue connection producing normalised [`Ingested`] liquidations.
///
/// Adapters own their reconnect policy: transport failures never surface to the consumer,
/// they show up in [`AdapterHealth`] instead.
pub trait ExchangeAdapter
where
    Self: Debug + Send,
{
    fn exchange(&self) -> ExchangeId;

    /// Spawn the adapter task. Fails only on permanent misconfiguration.
    fn start(self: Box<Self>, shutdown: Shutdown) -> Result<AdapterStream, DataError>;
}

/// Construct the adapter for an [`ExchangeId`].
///
/// `symbols` lists the monitored base assets (eg/ "BTC"); an empty list monitors every
/// symbol on venues that support all-market streams.
pub fn build_adapter(
    exchange: ExchangeId,
    settings: AdapterSettings,
    symbols: Vec<SmolStr>,
    table: Arc<SymbolTable>,
) -> Box<dyn ExchangeAdapter> {
    let url = settings.url.clone();

    match exchange {
        ExchangeId::BinanceFuturesUsd => Box::new(WsAdapter::new(
            BinanceFuturesUsd::new(url),
            settings,
            symbols,
            table,
        )),
        ExchangeId::BybitPerpetualsUsd => Box::new(WsAdapter::new(
            BybitPerpetualsUsd::new(url),
            settings,
            symbols,
            table,
        )),
        ExchangeId::Okx => Box::new(WsAdapter::new(Okx::new(url), settings, symbols, table)),
        ExchangeId::Bitmex => Box::new(WsAdapter::new(Bitmex::new(url), settings, symbols, table)),
        ExchangeId::Hyperliquid => {
            let liquidators = settings.liquidators.clone();
            Box::new(WsAdapter::new(
                Hyperliquid::new(url, liquidators),
                settings,
                symbols,
                table,
            ))
        }
        ExchangeId::DydxV4 => Box::new(PollAdapter::new(
            DydxV4::new(url),
            settings,
            symbols,
            table,
        )),
    }
}
