use self::liquidation::BybitLiquidationMessage;
use crate::{
    exchange::{
        Connector, LiquidationIter, PingInterval, RawLiquidation, resolve_url,
        side::{SideDetector, SideHint},
    },
    model::ExchangeId,
};
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::{SmolStr, format_smolstr};
use std::time::Duration;
use url::Url;

/// Liquidation types for [`BybitPerpetualsUsd`].
pub mod liquidation;

/// [`BybitPerpetualsUsd`] linear public server url.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/ws/connect>
pub const BASE_URL_BYBIT_PERPETUALS_USD: &str = "wss://stream.bybit.com/v5/public/linear";

/// [`BybitPerpetualsUsd`] server [`PingInterval`] duration.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/ws/connect#how-to-send-the-heartbeat-packet>
pub const PING_INTERVAL_BYBIT: Duration = Duration::from_secs(20);

/// Maximum number of topics Bybit accepts in a single subscribe request.
const MAX_ARGS_PER_REQUEST: usize = 10;

/// [`BybitPerpetualsUsd`] stream emitting liquidation events for one symbol.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/websocket/public/all-liquidation>
pub const CHANNEL_ALL_LIQUIDATION: &str = "allLiquidation";

/// Generic [`BybitPerpetualsUsd`] topic payload.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BybitPayload<T> {
    pub topic: SmolStr,
    #[serde(rename = "type")]
    pub kind: SmolStr,
    #[serde(deserialize_with = "cascade_integration::de::de_u64_epoch_ms_as_datetime_utc")]
    pub ts: DateTime<Utc>,
    pub data: T,
}

/// [`BybitPerpetualsUsd`] USDT margined perpetuals exchange.
///
/// The all-liquidation channel is per symbol, so an explicit symbol list is required.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct BybitPerpetualsUsd {
    url: Option<String>,
}

impl BybitPerpetualsUsd {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }

    /// Venue market for a base asset symbol (eg/ "BTC" -> "BTCUSDT").
    pub fn market(symbol: &str) -> SmolStr {
        format_smolstr!("{symbol}USDT")
    }
}

impl Connector for BybitPerpetualsUsd {
    const ID: ExchangeId = ExchangeId::BybitPerpetualsUsd;
    type Message = BybitLiquidationMessage;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_BYBIT_PERPETUALS_USD)
    }

    fn ping_interval(&self) -> Option<PingInterval> {
        Some(PingInterval {
            interval: tokio::time::interval(PING_INTERVAL_BYBIT),
            ping: || WsMessage::text(json!({ "op": "ping" }).to_string()),
        })
    }

    fn requests(&self, symbols: &[SmolStr]) -> Vec<WsMessage> {
        symbols
            .chunks(MAX_ARGS_PER_REQUEST)
            .map(|chunk| {
                let args = chunk
                    .iter()
                    .map(|symbol| format!("{CHANNEL_ALL_LIQUIDATION}.{}", Self::market(symbol)))
                    .collect::<Vec<_>>();

                WsMessage::text(json!({ "op": "subscribe", "args": args }).to_string())
            })
            .collect()
    }

    fn requires_symbols(&self) -> bool {
        true
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::PositionSide
    }

    fn liquidations(&self, message: Self::Message, _: DateTime<Utc>) -> LiquidationIter {
        match message {
            BybitLiquidationMessage::Ignore => vec![],
            BybitLiquidationMessage::Payload(payload) => payload
                .data
                .into_iter()
                .map(|entry| {
                    Ok(RawLiquidation {
                        market: entry.market,
                        hint: SideHint::order(entry.side),
                        price: entry.price,
                        quantity: entry.quantity,
                        time: entry.time,
                        seq: None,
                    })
                })
                .collect(),
        }
    }
}
