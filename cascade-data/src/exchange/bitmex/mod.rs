use self::liquidation::BitmexLiquidationMessage;
use crate::{
    exchange::{
        Connector, LiquidationIter, PingInterval, RawLiquidation, resolve_url, seq_from_str,
        side::{SideDetector, SideHint},
    },
    model::ExchangeId,
};
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use smol_str::SmolStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Liquidation types for [`Bitmex`].
pub mod liquidation;

/// [`Bitmex`] realtime server url.
///
/// See docs: <https://www.bitmex.com/app/wsAPI>
pub const BASE_URL_BITMEX: &str = "wss://ws.bitmex.com/realtime";

/// [`Bitmex`] expects a "ping" whenever no message has arrived for 5 seconds.
///
/// See docs: <https://www.bitmex.com/app/wsAPI#Heartbeats>
pub const PING_INTERVAL_BITMEX: Duration = Duration::from_secs(5);

/// [`Bitmex`] liquidation table name.
pub const TABLE_LIQUIDATION: &str = "liquidation";

/// How a [`Bitmex`] contract count converts into base asset units.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BitmexContract {
    /// Each contract is worth 1 USD of the base asset.
    InverseUsd,
    /// Each contract is a fixed amount of the base asset.
    Linear(Decimal),
}

/// [`Bitmex`] exchange, subscribed to the liquidation table for every instrument.
///
/// Liquidation rows carry no timestamp, so the local receive time is used. Only "insert"
/// actions are new liquidations; "update" & "delete" track the resting order.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Bitmex {
    url: Option<String>,
}

impl Bitmex {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }

    pub fn contract(symbol: &str) -> Option<BitmexContract> {
        match symbol {
            "XBTUSD" => Some(BitmexContract::InverseUsd),
            "XBTUSDT" => Some(BitmexContract::Linear(Decimal::new(1, 6))),
            _ => None,
        }
    }
}

impl Connector for Bitmex {
    const ID: ExchangeId = ExchangeId::Bitmex;
    type Message = BitmexLiquidationMessage;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_BITMEX)
    }

    fn ping_interval(&self) -> Option<PingInterval> {
        Some(PingInterval {
            interval: tokio::time::interval(PING_INTERVAL_BITMEX),
            ping: || WsMessage::text("ping"),
        })
    }

    fn requests(&self, _: &[SmolStr]) -> Vec<WsMessage> {
        vec![WsMessage::text(
            json!({ "op": "subscribe", "args": [TABLE_LIQUIDATION] }).to_string(),
        )]
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::OrderSide
    }

    fn is_heartbeat(&self, text: &str) -> bool {
        text == "pong"
    }

    fn liquidations(&self, message: Self::Message, received: DateTime<Utc>) -> LiquidationIter {
        let BitmexLiquidationMessage::Insert(rows) = message else {
            return vec![];
        };

        rows.into_iter()
            .filter_map(|row| {
                let quantity = match Self::contract(&row.symbol) {
                    Some(BitmexContract::InverseUsd) if !row.price.is_zero() => {
                        row.leaves_qty / row.price
                    }
                    Some(BitmexContract::Linear(multiplier)) => row.leaves_qty * multiplier,
                    _ => {
                        debug!(symbol = %row.symbol, "skipping BitMEX liquidation with unknown contract size");
                        return None;
                    }
                };

                Some(Ok(RawLiquidation {
                    market: row.symbol,
                    hint: SideHint::order(row.side),
                    price: row.price,
                    quantity,
                    time: received,
                    seq: Some(seq_from_str(&row.order_id)),
                }))
            })
            .collect()
    }
}
