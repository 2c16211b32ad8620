use crate::model::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// [`BinanceFuturesUsd`](super::BinanceFuturesUsd) Liquidation order message.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Liquidation-Order-Streams>
/// ```json
/// {
///     "e": "forceOrder",
///     "E": 1665523974222,
///     "o": {
///         "s": "BTCUSDT",
///         "S": "SELL",
///         "o": "LIMIT",
///         "f": "IOC",
///         "q": "0.009",
///         "p": "18917.15",
///         "ap": "18990.00",
///         "X": "FILLED",
///         "l": "0.009",
///         "z": "0.009",
///         "T": 1665523974217
///     }
/// }
/// ```
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BinanceLiquidation {
    #[serde(alias = "o")]
    pub order: BinanceLiquidationOrder,
}

/// [`BinanceFuturesUsd`](super::BinanceFuturesUsd) Liquidation order.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BinanceLiquidationOrder {
    #[serde(alias = "s")]
    pub symbol: SmolStr,

    #[serde(alias = "S")]
    pub side: OrderSide,

    #[serde(alias = "p", deserialize_with = "cascade_integration::de::de_str")]
    pub price: Decimal,

    #[serde(alias = "ap", deserialize_with = "cascade_integration::de::de_str")]
    pub average_price: Decimal,

    #[serde(alias = "q", deserialize_with = "cascade_integration::de::de_str")]
    pub original_quantity: Decimal,

    #[serde(alias = "z", deserialize_with = "cascade_integration::de::de_str")]
    pub filled_accumulated_quantity: Decimal,

    #[serde(
        alias = "T",
        deserialize_with = "cascade_integration::de::de_u64_epoch_ms_as_datetime_utc"
    )]
    pub time: DateTime<Utc>,
}
