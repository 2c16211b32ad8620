use crate::model::{OrderSide, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Terse type alias for an [`Okx`](super::Okx) liquidation orders payload.
pub type OkxLiquidations = OkxLiquidationPayload<OkxLiquidation>;

/// Messages received on the [`Okx`](super::Okx) public socket.
///
/// Subscription events (eg/ `{"event":"subscribe",...}`) carry no "data" and are ignored.
#[derive(Clone, Debug)]
pub enum OkxLiquidationMessage {
    Ignore,
    Payload(OkxLiquidations),
}

impl<'de> Deserialize<'de> for OkxLiquidationMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        match value.get("data") {
            Some(data) if data.is_array() => OkxLiquidations::deserialize(&value)
                .map(OkxLiquidationMessage::Payload)
                .map_err(serde::de::Error::custom),
            _ => Ok(OkxLiquidationMessage::Ignore),
        }
    }
}

/// [`Okx`](super::Okx) liquidation WebSocket payload.
///
/// See docs: <https://www.okx.com/docs-v5/en/#websocket-api-public-channel-liquidation-orders-channel>
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxLiquidationPayload<T> {
    pub arg: OkxArg,
    pub data: Vec<T>,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxArg {
    pub channel: SmolStr,
    #[serde(default)]
    pub inst_type: Option<SmolStr>,
}

/// [`Okx`](super::Okx) liquidation order.
///
/// ### Raw Payload Examples
/// ```json
/// {
///     "details": [
///         {
///             "bkLoss": "0",
///             "bkPx": "0.007831",
///             "ccy": "",
///             "posSide": "short",
///             "side": "buy",
///             "sz": "13",
///             "ts": "1692266434010"
///         }
///     ],
///     "instFamily": "IOST-USDT",
///     "instId": "IOST-USDT-SWAP",
///     "instType": "SWAP",
///     "uly": "IOST-USDT"
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxLiquidation {
    #[serde(rename = "instId")]
    pub inst_id: SmolStr,
    #[serde(rename = "instType")]
    pub inst_type: SmolStr,
    #[serde(rename = "details")]
    pub details: Vec<OkxLiquidationDetail>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OkxLiquidationDetail {
    #[serde(rename = "side")]
    pub side: OrderSide,
    #[serde(rename = "posSide", default)]
    pub position_side: OkxPositionSide,
    #[serde(rename = "bkPx", deserialize_with = "cascade_integration::de::de_str")]
    pub price: Decimal,
    #[serde(rename = "sz", deserialize_with = "cascade_integration::de::de_str")]
    pub size: Decimal,
    #[serde(
        rename = "ts",
        deserialize_with = "cascade_integration::de::de_str_u64_epoch_ms_as_datetime_utc"
    )]
    pub time: DateTime<Utc>,
}

/// Position direction, "net" in one-way position mode.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OkxPositionSide {
    Long,
    Short,
    #[default]
    #[serde(other)]
    Net,
}

impl From<OkxPositionSide> for Option<Side> {
    fn from(value: OkxPositionSide) -> Self {
        match value {
            OkxPositionSide::Long => Some(Side::Long),
            OkxPositionSide::Short => Some(Side::Short),
            OkxPositionSide::Net => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Connector, okx::Okx};
    use rust_decimal_macros::dec;

    #[test]
    fn test_de_okx_liquidation_message() {
        struct TestCase {
            input: &'static str,
            expected: Option<Vec<(Decimal, Option<Side>)>>,
        }

        let tests = vec![
            TestCase {
                // TC0: subscription event is ignored
                input: r#"{"event":"subscribe","arg":{"channel":"liquidation-orders","instType":"SWAP"},"connId":"a4d3ae55"}"#,
                expected: Some(vec![]),
            },
            TestCase {
                // TC1: IOST linear contracts are 1000 IOST, posSide short
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"0.007831","ccy":"","posSide":"short","side":"buy","sz":"13","ts":"1692266434010"}],"instFamily":"IOST-USDT","instId":"IOST-USDT-SWAP","instType":"SWAP","uly":"IOST-USDT"}]}"#,
                expected: Some(vec![(dec!(13000), Some(Side::Short))]),
            },
            TestCase {
                // TC2: BTC linear contracts are 0.01 BTC, net mode
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"60000","ccy":"","posSide":"net","side":"sell","sz":"250","ts":"1692266434010"}],"instFamily":"BTC-USDT","instId":"BTC-USDT-SWAP","instType":"SWAP","uly":"BTC-USDT"}]}"#,
                expected: Some(vec![(dec!(2.50), Some(Side::Long))]),
            },
            TestCase {
                // TC3: BTC inverse contracts are 100 USD
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"50000","ccy":"","posSide":"long","side":"sell","sz":"1000","ts":"1692266434010"}],"instFamily":"BTC-USD","instId":"BTC-USD-SWAP","instType":"SWAP","uly":"BTC-USD"}]}"#,
                expected: Some(vec![(dec!(2), Some(Side::Long))]),
            },
            TestCase {
                // TC4: bad size
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"1","ccy":"","posSide":"long","side":"sell","sz":"x","ts":"1692266434010"}],"instFamily":"BTC-USD","instId":"BTC-USD-SWAP","instType":"SWAP","uly":"BTC-USD"}]}"#,
                expected: None,
            },
            TestCase {
                // TC5: unknown linear contract size is skipped
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"2.5","ccy":"","posSide":"long","side":"sell","sz":"40","ts":"1692266434010"}],"instFamily":"PEPE9-USDT","instId":"PEPE9-USDT-SWAP","instType":"SWAP","uly":"PEPE9-USDT"}]}"#,
                expected: Some(vec![]),
            },
            TestCase {
                // TC6: unknown inverse face value is skipped
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"2.5","ccy":"","posSide":"long","side":"sell","sz":"40","ts":"1692266434010"}],"instFamily":"PEPE9-USD","instId":"PEPE9-USD-SWAP","instType":"SWAP","uly":"PEPE9-USD"}]}"#,
                expected: Some(vec![]),
            },
            TestCase {
                // TC7: ETH inverse contracts are 10 USD
                input: r#"{"arg":{"channel":"liquidation-orders","instType":"SWAP"},"data":[{"details":[{"bkLoss":"0","bkPx":"2500","ccy":"","posSide":"short","side":"buy","sz":"500","ts":"1692266434010"}],"instFamily":"ETH-USD","instId":"ETH-USD-SWAP","instType":"SWAP","uly":"ETH-USD"}]}"#,
                expected: Some(vec![(dec!(2), Some(Side::Short))]),
            },
        ];

        let connector = Okx::default();
        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<OkxLiquidationMessage>(test.input)
                .ok()
                .map(|message| {
                    connector
                        .liquidations(message, Utc::now())
                        .into_iter()
                        .map(|raw| {
                            let raw = raw.unwrap();
                            (raw.quantity, connector.side_detector().detect(&raw.hint))
                        })
                        .collect::<Vec<_>>()
                });
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_okx_heartbeat() {
        assert!(Okx::default().is_heartbeat("pong"));
        assert!(serde_json::from_str::<OkxLiquidationMessage>("pong").is_err());
    }
}
