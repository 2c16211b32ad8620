use crate::model::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Messages received on the [`Hyperliquid`](super::Hyperliquid) socket.
///
/// Only the "trades" channel is decoded, everything else ("subscriptionResponse", "pong")
/// is ignored.
#[derive(Clone, Debug)]
pub enum HyperliquidMessage {
    Ignore,
    Trades(Vec<HyperliquidTrade>),
}

impl<'de> Deserialize<'de> for HyperliquidMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if value.get("channel").and_then(Value::as_str) != Some("trades") {
            return Ok(HyperliquidMessage::Ignore);
        }

        match value.get("data") {
            Some(data) => Vec::<HyperliquidTrade>::deserialize(data)
                .map(HyperliquidMessage::Trades)
                .map_err(serde::de::Error::custom),
            None => Err(serde::de::Error::missing_field("data")),
        }
    }
}

/// [`Hyperliquid`](super::Hyperliquid) public trade.
///
/// ### Raw Payload Examples
/// See docs: <https://hyperliquid.gitbook.io/hyperliquid-docs/for-developers/api/websocket/subscriptions>
/// ```json
/// {
///     "coin": "BTC",
///     "side": "A",
///     "px": "97000.0",
///     "sz": "0.25",
///     "time": 1739502302929,
///     "hash": "0x...",
///     "tid": 913771249402451,
///     "users": ["0xbuyer", "0xseller"]
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct HyperliquidTrade {
    pub coin: SmolStr,
    pub side: OrderSide,
    #[serde(rename = "px", deserialize_with = "cascade_integration::de::de_str")]
    pub price: Decimal,
    #[serde(rename = "sz", deserialize_with = "cascade_integration::de::de_str")]
    pub size: Decimal,
    #[serde(deserialize_with = "cascade_integration::de::de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
    pub tid: u64,
    /// Buyer then seller address.
    pub users: [SmolStr; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::{Connector, hyperliquid::Hyperliquid, side::HYPERLIQUID_LIQUIDATOR},
        model::Side,
    };
    use rust_decimal_macros::dec;

    fn trades(buyer: &str, seller: &str) -> String {
        format!(
            r#"{{"channel":"trades","data":[{{"coin":"BTC","side":"A","px":"97000.0","sz":"0.25","time":1739502302929,"hash":"0x00","tid":42,"users":["{buyer}","{seller}"]}}]}}"#
        )
    }

    #[test]
    fn test_hyperliquid_liquidator_fills() {
        struct TestCase {
            input: String,
            expected: Vec<Option<Side>>,
        }

        let other = "0x0000000000000000000000000000000000000001";

        let tests = vec![
            TestCase {
                // TC0: subscription response is ignored
                input: r#"{"channel":"subscriptionResponse","data":{"method":"subscribe","subscription":{"type":"trades","coin":"BTC"}}}"#.to_string(),
                expected: vec![],
            },
            TestCase {
                // TC1: liquidator buys, long liquidated
                input: trades(HYPERLIQUID_LIQUIDATOR, other),
                expected: vec![Some(Side::Long)],
            },
            TestCase {
                // TC2: liquidator sells, short liquidated
                input: trades(other, HYPERLIQUID_LIQUIDATOR),
                expected: vec![Some(Side::Short)],
            },
            TestCase {
                // TC3: ordinary trade
                input: trades(other, other),
                expected: vec![None],
            },
        ];

        let connector = Hyperliquid::default();
        let detector = connector.side_detector();

        for (index, test) in tests.into_iter().enumerate() {
            let message = serde_json::from_str::<HyperliquidMessage>(&test.input).unwrap();
            let actual = connector
                .liquidations(message, Utc::now())
                .into_iter()
                .map(|raw| detector.detect(&raw.unwrap().hint))
                .collect::<Vec<_>>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_de_hyperliquid_trade() {
        let message = serde_json::from_str::<HyperliquidMessage>(&trades("0xa", "0xb")).unwrap();
        let HyperliquidMessage::Trades(trades) = message else {
            panic!("expected trades");
        };

        assert_eq!(trades[0].price, dec!(97000.0));
        assert_eq!(trades[0].size, dec!(0.25));
        assert_eq!(trades[0].tid, 42);
        assert_eq!(trades[0].side, OrderSide::Sell);
    }
}
