use super::BybitPayload;
use crate::model::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// [`BybitPerpetualsUsd`](super::BybitPerpetualsUsd) all liquidation payload.
pub type BybitAllLiquidation = BybitPayload<Vec<BybitAllLiquidationInner>>;

/// Messages received on the Bybit all liquidation stream.
///
/// Subscription acknowledgements & pongs carry no "topic" and are ignored.
#[derive(Clone, Debug)]
pub enum BybitLiquidationMessage {
    Ignore,
    Payload(BybitAllLiquidation),
}

impl<'de> Deserialize<'de> for BybitLiquidationMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        match value.get("topic") {
            Some(topic) if topic.is_string() => BybitAllLiquidation::deserialize(&value)
                .map(BybitLiquidationMessage::Payload)
                .map_err(serde::de::Error::custom),
            _ => Ok(BybitLiquidationMessage::Ignore),
        }
    }
}

/// Individual liquidation entry included within an [`BybitAllLiquidation`] payload.
///
/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/websocket/public/all-liquidation>
/// ```json
/// {
///     "topic": "allLiquidation.ROSEUSDT",
///     "type": "snapshot",
///     "ts": 1739502303204,
///     "data": [
///         { "T": 1739502302929, "s": "ROSEUSDT", "S": "Sell", "v": "20000", "p": "0.04499" }
///     ]
/// }
/// ```
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BybitAllLiquidationInner {
    #[serde(
        alias = "T",
        deserialize_with = "cascade_integration::de::de_u64_epoch_ms_as_datetime_utc"
    )]
    pub time: DateTime<Utc>,

    #[serde(rename = "s")]
    pub market: SmolStr,

    /// Side of the liquidated position: "Buy" means a long was liquidated.
    #[serde(rename = "S")]
    pub side: OrderSide,

    #[serde(alias = "v", deserialize_with = "cascade_integration::de::de_str")]
    pub quantity: Decimal,

    #[serde(alias = "p", deserialize_with = "cascade_integration::de::de_str")]
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::{Connector, bybit::BybitPerpetualsUsd},
        model::Side,
    };
    use rust_decimal_macros::dec;

    #[test]
    fn test_de_bybit_liquidation_message() {
        struct TestCase {
            input: &'static str,
            expected: Option<usize>,
        }

        let tests = vec![
            TestCase {
                // TC0: subscription acknowledgement is ignored
                input: r#"{"success":true,"ret_msg":"","conn_id":"abc","op":"subscribe"}"#,
                expected: Some(0),
            },
            TestCase {
                // TC1: pong is ignored
                input: r#"{"success":true,"ret_msg":"pong","conn_id":"abc","op":"ping"}"#,
                expected: Some(0),
            },
            TestCase {
                // TC2: liquidation snapshot
                input: r#"{"topic":"allLiquidation.ROSEUSDT","type":"snapshot","ts":1739502303204,"data":[{"T":1739502302929,"s":"ROSEUSDT","S":"Sell","v":"20000","p":"0.04499"}]}"#,
                expected: Some(1),
            },
            TestCase {
                // TC3: topic present but payload malformed
                input: r#"{"topic":"allLiquidation.ROSEUSDT","type":"snapshot","ts":1739502303204,"data":[{"T":1739502302929,"s":"ROSEUSDT","S":"Sell","v":"x","p":"0.04499"}]}"#,
                expected: None,
            },
        ];

        let connector = BybitPerpetualsUsd::default();
        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<BybitLiquidationMessage>(test.input)
                .ok()
                .map(|message| connector.liquidations(message, Utc::now()).len());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_bybit_sell_means_short_liquidated() {
        let input = r#"{"topic":"allLiquidation.BTCUSDT","type":"snapshot","ts":1739502303204,"data":[{"T":1739502302929,"s":"BTCUSDT","S":"Sell","v":"0.5","p":"96000"}]}"#;

        let connector = BybitPerpetualsUsd::default();
        let message = serde_json::from_str::<BybitLiquidationMessage>(input).unwrap();
        let raw = connector
            .liquidations(message, Utc::now())
            .pop()
            .unwrap()
            .unwrap();

        assert_eq!(raw.price, dec!(96000));
        assert_eq!(raw.quantity, dec!(0.5));
        assert_eq!(raw.time.timestamp_millis(), 1739502302929);
        assert_eq!(connector.side_detector().detect(&raw.hint), Some(Side::Short));
    }
}
