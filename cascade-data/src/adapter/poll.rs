use crate::{
    adapter::{
        AdapterSettings, AdapterStream, ExchangeAdapter, health::AdapterHealth,
        normalise::Normaliser,
    },
    error::DataError,
    exchange::{LiquidationIter, side::SideDetector},
    model::{ExchangeId, event::Ingested, symbol::SymbolTable},
    now_ms,
    shutdown::Shutdown,
};
use async_trait::async_trait;
use cascade_integration::error::SocketError;
use smol_str::SmolStr;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{info, warn};
use url::Url;

/// Venue specific knowledge required by a REST polling adapter.
#[async_trait]
pub trait Poller
where
    Self: Debug + Send + 'static,
{
    const ID: ExchangeId;

    /// Base [`Url`] of the venue REST API.
    fn url(&self) -> Result<Url, SocketError>;

    fn side_detector(&self) -> SideDetector;

    /// Fetch liquidations published since the previous poll.
    async fn poll(
        &mut self,
        client: &reqwest::Client,
        base_url: &Url,
        symbols: &[SmolStr],
    ) -> Result<LiquidationIter, SocketError>;
}

/// Polling adapter for venues without a usable push feed.
///
/// A failed request marks the adapter disconnected and backs off with the same jittered
/// policy as the WebSocket adapters.
#[derive(Debug)]
pub struct PollAdapter<P> {
    poller: P,
    settings: AdapterSettings,
    symbols: Vec<SmolStr>,
    table: Arc<SymbolTable>,
}

impl<P> PollAdapter<P>
where
    P: Poller,
{
    pub fn new(
        poller: P,
        settings: AdapterSettings,
        symbols: Vec<SmolStr>,
        table: Arc<SymbolTable>,
    ) -> Self {
        Self {
            poller,
            settings,
            symbols,
            table,
        }
    }
}

impl<P> ExchangeAdapter for PollAdapter<P>
where
    P: Poller,
{
    fn exchange(&self) -> ExchangeId {
        P::ID
    }

    fn start(self: Box<Self>, shutdown: Shutdown) -> Result<AdapterStream, DataError> {
        let url = self.poller.url()?;

        if self.symbols.is_empty() {
            return Err(DataError::Config {
                exchange: P::ID,
                reason: "polling requires an explicit symbol list".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| DataError::Config {
                exchange: P::ID,
                reason: error.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let health = Arc::new(AdapterHealth::new(P::ID, self.settings.malformed_warn_every));
        let normaliser = Normaliser::new(
            P::ID,
            self.poller.side_detector(),
            Arc::clone(&self.table),
            &self.symbols,
            Arc::clone(&health),
        )
        .with_max_clock_skew(self.settings.max_clock_skew);

        let task = tokio::spawn(run(*self, client, url, normaliser, tx, shutdown));

        Ok(AdapterStream {
            exchange: P::ID,
            events: rx,
            health,
            task,
        })
    }
}

async fn run<P>(
    mut adapter: PollAdapter<P>,
    client: reqwest::Client,
    url: Url,
    normaliser: Normaliser,
    tx: mpsc::Sender<Ingested>,
    mut shutdown: Shutdown,
) where
    P: Poller,
{
    let exchange = P::ID;
    let health = Arc::clone(normaliser.health());
    let mut backoff = adapter.settings.reconnect.backoff();
    let mut interval = tokio::time::interval(adapter.settings.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(%exchange, %url, symbols = ?adapter.symbols, "starting liquidation poller");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            result = adapter.poller.poll(&client, &url, &adapter.symbols) => result,
        };

        match result {
            Ok(batch) => {
                if !health.is_connected() {
                    health.set_connected(now_ms());
                    info!(%exchange, "liquidation poller connected");
                }
                backoff.reset();
                health.record_message();

                for ingested in normaliser.normalise_all(batch, now_ms()) {
                    if tx.send(ingested).await.is_err() {
                        info!(%exchange, "liquidation consumer dropped, stopping poller");
                        return;
                    }
                    health.record_event();
                }
            }
            Err(error) => {
                health.set_disconnected();
                health.record_reconnect();
                let delay = backoff.next_delay();
                warn!(
                    %exchange,
                    %error,
                    attempt = backoff.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "liquidation poll failed, backing off"
                );

                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    health.set_disconnected();
    info!(%exchange, "liquidation poller stopped");
}
