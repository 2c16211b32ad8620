use self::liquidation::{OkxLiquidationMessage, OkxLiquidations};
use crate::{
    error::DataError,
    exchange::{
        Connector, LiquidationIter, PingInterval, RawLiquidation, resolve_url,
        side::{SideDetector, SideHint},
    },
    model::{ExchangeId, symbol::normalise_symbol},
};
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use smol_str::SmolStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Liquidation types for [`Okx`].
pub mod liquidation;

/// [`Okx`] server base url.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-api-resources-and-support>
pub const BASE_URL_OKX: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// [`Okx`] server [`PingInterval`] duration.
///
/// See docs: <https://www.okx.com/docs-v5/en/#websocket-api-connect>
pub const PING_INTERVAL_OKX: Duration = Duration::from_secs(29);

/// [`Okx`] liquidation orders channel.
pub const CHANNEL_LIQUIDATION_ORDERS: &str = "liquidation-orders";

/// [`Okx`] exchange, subscribed to every SWAP liquidation.
///
/// Okx reports size in contracts. Linear swaps (eg/ "BTC-USDT-SWAP") are converted with the
/// base asset contract value, inverse swaps (eg/ "BTC-USD-SWAP") with the USD face value.
///
/// See docs: <https://www.okx.com/docs-v5/en/#websocket-api>
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Okx {
    url: Option<String>,
}

impl Okx {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }

    /// Base asset per contract of a USDT margined swap, if known.
    pub fn linear_contract_value(base: &str) -> Option<Decimal> {
        let value = match base {
            "BTC" | "BNB" => Decimal::new(1, 2),
            "ETH" | "BCH" => Decimal::new(1, 1),
            "SOL" | "LTC" | "LINK" | "AVAX" | "DOT" => Decimal::ONE,
            "ETC" => Decimal::TEN,
            "XRP" | "ADA" => Decimal::ONE_HUNDRED,
            "DOGE" | "TRX" | "IOST" => Decimal::ONE_THOUSAND,
            _ => return None,
        };
        Some(value)
    }

    /// USD face value per contract of a coin margined swap, if known.
    pub fn inverse_contract_value(base: &str) -> Option<Decimal> {
        match base {
            "BTC" => Some(Decimal::ONE_HUNDRED),
            "ETH" | "SOL" | "XRP" | "DOGE" | "LTC" | "ADA" | "LINK" | "DOT" | "BCH" | "TRX"
            | "AVAX" | "ETC" | "FIL" => Some(Decimal::TEN),
            _ => None,
        }
    }

    /// How contracts of an instrument (eg/ "BTC-USD-SWAP") convert into base asset units.
    pub fn contract(inst_id: &str) -> Option<OkxContract> {
        let base = normalise_symbol(inst_id);
        if inst_id.contains("-USD-") {
            Self::inverse_contract_value(&base).map(OkxContract::InverseUsd)
        } else {
            Self::linear_contract_value(&base).map(OkxContract::Linear)
        }
    }
}

/// How an [`Okx`] contract count converts into base asset units.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OkxContract {
    /// Each contract has a fixed USD face value.
    InverseUsd(Decimal),
    /// Each contract is a fixed amount of the base asset.
    Linear(Decimal),
}

impl Connector for Okx {
    const ID: ExchangeId = ExchangeId::Okx;
    type Message = OkxLiquidationMessage;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_OKX)
    }

    fn ping_interval(&self) -> Option<PingInterval> {
        Some(PingInterval {
            interval: tokio::time::interval(PING_INTERVAL_OKX),
            ping: || WsMessage::text("ping"),
        })
    }

    fn requests(&self, _: &[SmolStr]) -> Vec<WsMessage> {
        vec![WsMessage::text(
            json!({
                "op": "subscribe",
                "args": [{ "channel": CHANNEL_LIQUIDATION_ORDERS, "instType": "SWAP" }],
            })
            .to_string(),
        )]
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::OrderSide
    }

    fn is_heartbeat(&self, text: &str) -> bool {
        text == "pong"
    }

    fn liquidations(&self, message: Self::Message, _: DateTime<Utc>) -> LiquidationIter {
        match message {
            OkxLiquidationMessage::Ignore => vec![],
            OkxLiquidationMessage::Payload(payload) => liquidations_from(payload),
        }
    }
}

fn liquidations_from(payload: OkxLiquidations) -> LiquidationIter {
    payload
        .data
        .into_iter()
        .filter(|liquidation| liquidation.inst_type == "SWAP")
        .flat_map(|liquidation| {
            let inst_id = liquidation.inst_id;
            let contract = Okx::contract(&inst_id);
            if contract.is_none() {
                debug!(%inst_id, "skipping Okx liquidation with unknown contract size");
            }

            liquidation
                .details
                .into_iter()
                .filter_map(move |detail| {
                    let quantity = match contract? {
                        OkxContract::Linear(value) => detail.size * value,
                        OkxContract::InverseUsd(_) if detail.price.is_zero() => {
                            return Some(Err(DataError::Malformed {
                                exchange: ExchangeId::Okx,
                                reason: format!("zero bankruptcy price for inverse {inst_id}"),
                            }));
                        }
                        OkxContract::InverseUsd(face) => detail.size * face / detail.price,
                    };

                    Some(Ok(RawLiquidation {
                        market: inst_id.clone(),
                        hint: SideHint::Order {
                            side: detail.side,
                            position: detail.position_side.into(),
                        },
                        price: detail.price,
                        quantity,
                        time: detail.time,
                        seq: None,
                    }))
                })
        })
        .collect()
}
