use self::trade::HyperliquidMessage;
use crate::exchange::{
    Connector, LiquidationIter, PingInterval, RawLiquidation, resolve_url,
    side::{HYPERLIQUID_LIQUIDATOR, SideDetector, SideHint},
};
use crate::model::ExchangeId;
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use serde_json::json;
use smol_str::SmolStr;
use std::time::Duration;
use url::Url;

/// Public trade types for [`Hyperliquid`].
pub mod trade;

/// [`Hyperliquid`] mainnet WebSocket url.
///
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/websocket>
pub const BASE_URL_HYPERLIQUID: &str = "wss://api.hyperliquid.xyz/ws";

/// [`Hyperliquid`] closes connections silent for 60s.
///
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/websocket/timeouts-and-heartbeats>
pub const PING_INTERVAL_HYPERLIQUID: Duration = Duration::from_secs(50);

/// [`Hyperliquid`] exchange.
///
/// There is no public liquidation feed, so every trade for the monitored coins is streamed
/// and the [`SideDetector::Counterparty`] strategy keeps only fills against a known
/// liquidator address.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Hyperliquid {
    url: Option<String>,
    liquidators: Vec<SmolStr>,
}

impl Default for Hyperliquid {
    fn default() -> Self {
        Self::new(None, Vec::new())
    }
}

impl Hyperliquid {
    /// Construct a [`Hyperliquid`] connector. An empty `liquidators` list falls back to
    /// [`HYPERLIQUID_LIQUIDATOR`].
    pub fn new(url: Option<String>, liquidators: Vec<SmolStr>) -> Self {
        let liquidators = if liquidators.is_empty() {
            vec![SmolStr::new_static(HYPERLIQUID_LIQUIDATOR)]
        } else {
            liquidators
        };

        Self { url, liquidators }
    }
}

impl Connector for Hyperliquid {
    const ID: ExchangeId = ExchangeId::Hyperliquid;
    type Message = HyperliquidMessage;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_HYPERLIQUID)
    }

    fn ping_interval(&self) -> Option<PingInterval> {
        Some(PingInterval {
            interval: tokio::time::interval(PING_INTERVAL_HYPERLIQUID),
            ping: || WsMessage::text(json!({ "method": "ping" }).to_string()),
        })
    }

    fn requests(&self, symbols: &[SmolStr]) -> Vec<WsMessage> {
        symbols
            .iter()
            .map(|coin| {
                WsMessage::text(
                    json!({
                        "method": "subscribe",
                        "subscription": { "type": "trades", "coin": coin },
                    })
                    .to_string(),
                )
            })
            .collect()
    }

    fn requires_symbols(&self) -> bool {
        true
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::counterparty(&self.liquidators)
    }

    fn liquidations(&self, message: Self::Message, _: DateTime<Utc>) -> LiquidationIter {
        let HyperliquidMessage::Trades(trades) = message else {
            return vec![];
        };

        trades
            .into_iter()
            .map(|trade| {
                let [buyer, seller] = trade.users;
                Ok(RawLiquidation {
                    market: trade.coin,
                    hint: SideHint::Counterparties { buyer, seller },
                    price: trade.price,
                    quantity: trade.size,
                    time: trade.time,
                    seq: Some(trade.tid),
                })
            })
            .collect()
    }
}
