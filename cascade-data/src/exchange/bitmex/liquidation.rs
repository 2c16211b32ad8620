use crate::{exchange::de_decimal, model::OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Messages received on the [`Bitmex`](super::Bitmex) realtime socket.
///
/// The welcome banner, subscription acknowledgements and non-insert table actions are
/// ignored.
#[derive(Clone, Debug)]
pub enum BitmexLiquidationMessage {
    Ignore,
    Insert(Vec<BitmexLiquidation>),
}

impl<'de> Deserialize<'de> for BitmexLiquidationMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let is_insert = value.get("table").and_then(Value::as_str) == Some(super::TABLE_LIQUIDATION)
            && value.get("action").and_then(Value::as_str) == Some("insert");

        if !is_insert {
            return Ok(BitmexLiquidationMessage::Ignore);
        }

        match value.get("data") {
            Some(data) => Vec::<BitmexLiquidation>::deserialize(data)
                .map(BitmexLiquidationMessage::Insert)
                .map_err(serde::de::Error::custom),
            None => Err(serde::de::Error::missing_field("data")),
        }
    }
}

/// [`Bitmex`](super::Bitmex) liquidation row.
///
/// ### Raw Payload Examples
/// See docs: <https://www.bitmex.com/app/wsAPI#Subscriptions>
/// ```json
/// {
///     "table": "liquidation",
///     "action": "insert",
///     "data": [
///         {
///             "orderID": "9c54b2b7-8b7a-4b58-8bde-3bdc2a1b6f0b",
///             "symbol": "XBTUSD",
///             "side": "Sell",
///             "price": 64000.5,
///             "leavesQty": 12800
///         }
///     ]
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexLiquidation {
    #[serde(rename = "orderID")]
    pub order_id: SmolStr,
    pub symbol: SmolStr,
    pub side: OrderSide,
    #[serde(deserialize_with = "de_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "de_decimal")]
    pub leaves_qty: Decimal,
}
