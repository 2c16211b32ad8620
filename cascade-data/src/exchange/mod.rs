use crate::{
    error::DataError,
    exchange::side::{SideDetector, SideHint},
    model::ExchangeId,
};
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use smol_str::SmolStr;
use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    str::FromStr,
};
use url::Url;

/// `Binance` USD-M futures liquidation stream.
pub mod binance;

/// `BitMEX` liquidation table.
pub mod bitmex;

/// `Bybit` linear perpetual all-liquidation stream.
pub mod bybit;

/// `dYdX v4` indexer trade polling.
pub mod dydx;

/// `Hyperliquid` trades, filtered to liquidator fills.
pub mod hyperliquid;

/// `Okx` swap liquidation orders.
pub mod okx;

/// [`SideDetector`] strategies mapping venue side fields to the liquidated position.
pub mod side;

/// Liquidation parsed from a venue message, before symbol interning & side detection.
#[derive(Clone, PartialEq, Debug)]
pub struct RawLiquidation {
    /// Venue instrument name (eg/ "BTCUSDT", "BTC-USDT-SWAP").
    pub market: SmolStr,
    pub hint: SideHint,
    pub price: Decimal,
    /// Quantity in base asset units, with any contract multiplier already applied.
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
    pub seq: Option<u64>,
}

/// Collection of parse results produced from one venue message.
pub type LiquidationIter = Vec<Result<RawLiquidation, DataError>>;

/// Defines the frequency & construction of custom application level pings some venues require
/// to keep a connection alive.
#[derive(Debug)]
pub struct PingInterval {
    pub interval: tokio::time::Interval,
    pub ping: fn() -> WsMessage,
}

/// Venue specific knowledge required by a WebSocket adapter: where to connect, what to
/// subscribe to, and how to read liquidations out of its messages.
pub trait Connector
where
    Self: Debug + Send + Sync + 'static,
{
    /// Unique identifier for the venue this [`Connector`] talks to.
    const ID: ExchangeId;

    /// Deserialisable type every text frame is parsed into.
    type Message: DeserializeOwned + Send;

    /// Base [`Url`] of the venue WebSocket server.
    fn url(&self) -> Result<Url, SocketError>;

    /// Custom application level ping, if the venue requires one.
    fn ping_interval(&self) -> Option<PingInterval> {
        None
    }

    /// Subscription requests for the provided base asset symbols (eg/ "BTC"). An empty slice
    /// means every symbol, where the venue supports it.
    fn requests(&self, symbols: &[SmolStr]) -> Vec<WsMessage>;

    /// True if the venue can only stream liquidations for explicitly named symbols.
    fn requires_symbols(&self) -> bool {
        false
    }

    fn side_detector(&self) -> SideDetector;

    /// Non-JSON keep-alive frames (eg/ "pong") that must not be counted as malformed.
    fn is_heartbeat(&self, _text: &str) -> bool {
        false
    }

    fn liquidations(&self, message: Self::Message, received: DateTime<Utc>) -> LiquidationIter;
}

/// Stable 64-bit sequence id for venues that identify prints with string ids.
pub fn seq_from_str(id: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Deserialize a decimal that may arrive as a JSON string or number, including scientific
/// notation (eg/ `1e-5`).
pub fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }

    let raw = match Raw::deserialize(deserializer)? {
        Raw::Str(raw) => raw,
        Raw::Num(raw) => raw.to_string(),
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(serde::de::Error::custom)
}

/// Resolve an optional configured url override, falling back to the venue default.
pub(crate) fn resolve_url(
    override_url: Option<&str>,
    default: &str,
) -> Result<Url, SocketError> {
    Url::parse(override_url.unwrap_or(default)).map_err(SocketError::UrlParse)
}
