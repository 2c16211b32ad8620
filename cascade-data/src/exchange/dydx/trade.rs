use crate::model::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// [`DydxV4`](super::DydxV4) indexer trades response.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct DydxTrades {
    pub trades: Vec<DydxTrade>,
}

/// [`DydxV4`](super::DydxV4) indexer trade.
///
/// ### Raw Payload Examples
/// See docs: <https://docs.dydx.exchange/api_integration-indexer/indexer_api#gettrades>
/// ```json
/// {
///     "id": "01a0b1c2",
///     "side": "SELL",
///     "size": "0.002",
///     "price": "60012.5",
///     "type": "LIQUIDATED",
///     "createdAt": "2024-05-01T00:00:00.123Z",
///     "createdAtHeight": "15000000"
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DydxTrade {
    pub id: SmolStr,
    /// Taker side. In a liquidation the liquidated account is the taker.
    pub side: OrderSide,
    #[serde(deserialize_with = "cascade_integration::de::de_str")]
    pub size: Decimal,
    #[serde(deserialize_with = "cascade_integration::de::de_str")]
    pub price: Decimal,
    #[serde(rename = "type")]
    pub kind: DydxTradeKind,
    #[serde(deserialize_with = "cascade_integration::de::de_rfc3339_as_datetime_utc")]
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DydxTradeKind {
    Liquidated,
    Deleveraged,
    #[serde(other)]
    Other,
}
