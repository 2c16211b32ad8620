use crate::{
    adapter::{
        AdapterSettings, AdapterStream, ExchangeAdapter, health::AdapterHealth,
        normalise::Normaliser,
    },
    error::DataError,
    exchange::{Connector, PingInterval},
    model::{ExchangeId, event::Ingested, symbol::SymbolTable},
    now_ms,
    shutdown::Shutdown,
    streams::timeout::TimeoutStream,
};
use cascade_integration::{
    backoff::Backoff,
    error::SocketError,
    protocol::websocket::{WsMessage, connect, process_close_frame},
};
use futures::{SinkExt, StreamExt};
use smol_str::SmolStr;
use std::{borrow::Cow, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Characters of an undecodable frame kept in its malformed reason.
pub const MALFORMED_PREVIEW_CHARS: usize = 256;

/// Reconnecting WebSocket adapter for any [`Connector`].
#[derive(Debug)]
pub struct WsAdapter<C> {
    connector: C,
    settings: AdapterSettings,
    symbols: Vec<SmolStr>,
    table: Arc<SymbolTable>,
}

/// Why a connection session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown was requested or the consumer went away.
    Shutdown,
    Disconnected(DataError),
}

impl<C> WsAdapter<C>
where
    C: Connector,
{
    pub fn new(
        connector: C,
        settings: AdapterSettings,
        symbols: Vec<SmolStr>,
        table: Arc<SymbolTable>,
    ) -> Self {
        Self {
            connector,
            settings,
            symbols,
            table,
        }
    }
}

impl<C> ExchangeAdapter for WsAdapter<C>
where
    C: Connector,
{
    fn exchange(&self) -> ExchangeId {
        C::ID
    }

    fn start(self: Box<Self>, shutdown: Shutdown) -> Result<AdapterStream, DataError> {
        let url = self.connector.url()?;

        if self.connector.requires_symbols() && self.symbols.is_empty() {
            return Err(DataError::Config {
                exchange: C::ID,
                reason: "venue requires an explicit symbol list".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let health = Arc::new(AdapterHealth::new(C::ID, self.settings.malformed_warn_every));
        let normaliser = Normaliser::new(
            C::ID,
            self.connector.side_detector(),
            Arc::clone(&self.table),
            &self.symbols,
            Arc::clone(&health),
        )
        .with_max_clock_skew(self.settings.max_clock_skew);

        let task = tokio::spawn(run(*self, url, normaliser, tx, shutdown));

        Ok(AdapterStream {
            exchange: C::ID,
            events: rx,
            health,
            task,
        })
    }
}

async fn run<C>(
    adapter: WsAdapter<C>,
    url: Url,
    normaliser: Normaliser,
    tx: mpsc::Sender<Ingested>,
    mut shutdown: Shutdown,
) where
    C: Connector,
{
    let exchange = C::ID;
    let health = Arc::clone(normaliser.health());
    let mut backoff = adapter.settings.reconnect.backoff();

    info!(%exchange, %url, symbols = ?adapter.symbols, "starting liquidation adapter");

    loop {
        let end = session(&adapter, &url, &normaliser, &tx, &mut backoff, &mut shutdown).await;
        health.set_disconnected();

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Disconnected(error) => warn!(
                %exchange,
                %error,
                terminal = error.is_terminal(),
                "liquidation adapter disconnected"
            ),
        }

        let delay = backoff.next_delay();
        health.record_reconnect();
        info!(
            %exchange,
            attempt = backoff.attempt(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "liquidation adapter reconnecting"
        );

        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(%exchange, "liquidation adapter stopped");
}

async fn session<C>(
    adapter: &WsAdapter<C>,
    url: &Url,
    normaliser: &Normaliser,
    tx: &mpsc::Sender<Ingested>,
    backoff: &mut Backoff,
    shutdown: &mut Shutdown,
) -> SessionEnd
where
    C: Connector,
{
    let exchange = C::ID;
    let health = normaliser.health();

    let websocket = tokio::select! {
        biased;
        _ = shutdown.wait() => return SessionEnd::Shutdown,
        result = connect(url) => match result {
            Ok(websocket) => websocket,
            Err(error) => return SessionEnd::Disconnected(error.into()),
        },
    };

    health.set_connected(now_ms());
    info!(%exchange, "liquidation adapter connected");

    let (mut write, read) = websocket.split();
    for request in adapter.connector.requests(&adapter.symbols) {
        debug!(%exchange, payload = ?request, "sending subscription request");
        if let Err(error) = write.send(request).await {
            return SessionEnd::Disconnected(SocketError::from(error).into());
        }
    }

    let mut read = TimeoutStream::new(read, adapter.settings.idle_timeout);
    let mut ping = adapter.connector.ping_interval();
    let mut healthy = false;

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            payload = next_ping(&mut ping) => {
                if let Err(error) = write.send(payload).await {
                    return SessionEnd::Disconnected(SocketError::from(error).into());
                }
                continue;
            }
            message = read.next() => message,
        };

        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(error)) => return SessionEnd::Disconnected(SocketError::from(error).into()),
            None if read.timed_out() => {
                let timeout = read.timeout_duration().as_secs();
                return SessionEnd::Disconnected(SocketError::ReadTimeout(timeout).into());
            }
            None => {
                return SessionEnd::Disconnected(
                    SocketError::Terminated("stream ended".to_string()).into(),
                );
            }
        };

        let batch = match &message {
            WsMessage::Text(text) => decode(adapter, normaliser, text.as_str()),
            WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => decode(adapter, normaliser, text),
                Err(error) => {
                    health.record_message();
                    health.record_malformed(&error);
                    continue;
                }
            },
            WsMessage::Close(frame) => {
                return SessionEnd::Disconnected(process_close_frame(frame.clone()).into());
            }
            _ => continue,
        };

        let Some(batch) = batch else {
            continue;
        };

        if !healthy {
            healthy = true;
            backoff.reset();
        }

        for ingested in batch {
            if tx.send(ingested).await.is_err() {
                debug!(%exchange, "liquidation consumer dropped, stopping adapter");
                return SessionEnd::Shutdown;
            }
            health.record_event();
        }
    }
}

/// Decode one text frame. Returns `None` for heartbeats & malformed frames.
fn decode<C>(adapter: &WsAdapter<C>, normaliser: &Normaliser, text: &str) -> Option<Vec<Ingested>>
where
    C: Connector,
{
    let health = normaliser.health();
    health.record_message();

    if adapter.connector.is_heartbeat(text) {
        return None;
    }

    match serde_json::from_str::<C::Message>(text) {
        Ok(message) => {
            let received = chrono::Utc::now();
            let batch = adapter.connector.liquidations(message, received);
            let received_ms = u64::try_from(received.timestamp_millis()).unwrap_or_default();
            Some(normaliser.normalise_all(batch, received_ms))
        }
        Err(error) => {
            health.record_malformed(&DataError::Malformed {
                exchange: C::ID,
                reason: format!("{error}: {}", preview(text)),
            });
            None
        }
    }
}

/// Leading [`MALFORMED_PREVIEW_CHARS`] of a frame, noting the full length when cut.
fn preview(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MALFORMED_PREVIEW_CHARS) {
        None => Cow::Borrowed(text),
        Some((end, _)) => Cow::Owned(format!("{}... ({} bytes)", &text[..end], text.len())),
    }
}

async fn next_ping(ping: &mut Option<PingInterval>) -> WsMessage {
    match ping {
        Some(ping) => {
            ping.interval.tick().await;
            (ping.ping)()
        }
        None => std::future::pending().await,
    }
}
