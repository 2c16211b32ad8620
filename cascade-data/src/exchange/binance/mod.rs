use self::liquidation::BinanceLiquidation;
use crate::{
    exchange::{
        Connector, LiquidationIter, RawLiquidation, resolve_url,
        side::{SideDetector, SideHint},
    },
    model::ExchangeId,
};
use cascade_integration::{error::SocketError, protocol::websocket::WsMessage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use url::Url;

/// Liquidation types for [`BinanceFuturesUsd`].
pub mod liquidation;

/// [`BinanceFuturesUsd`] all-market liquidation stream url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/All-Market-Liquidation-Order-Streams>
pub const BASE_URL_BINANCE_FUTURES_USD: &str = "wss://fstream.binance.com/ws/!forceOrder@arr";

/// [`BinanceFuturesUsd`] exchange.
///
/// The all-market stream is selected through the url, so no subscription requests are sent.
/// Binance drives keep-alive with protocol level pings.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct BinanceFuturesUsd {
    url: Option<String>,
}

impl BinanceFuturesUsd {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }
}

impl Connector for BinanceFuturesUsd {
    const ID: ExchangeId = ExchangeId::BinanceFuturesUsd;
    type Message = BinanceLiquidation;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_BINANCE_FUTURES_USD)
    }

    fn requests(&self, _: &[SmolStr]) -> Vec<WsMessage> {
        vec![]
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::OrderSide
    }

    fn liquidations(&self, message: Self::Message, _: DateTime<Utc>) -> LiquidationIter {
        let order = message.order;

        // Prefer the filled average price & accumulated fill over the order's limit values
        let price = if order.average_price > Decimal::ZERO {
            order.average_price
        } else {
            order.price
        };
        let quantity = if order.filled_accumulated_quantity > Decimal::ZERO {
            order.filled_accumulated_quantity
        } else {
            order.original_quantity
        };

        vec![Ok(RawLiquidation {
            market: order.symbol,
            hint: SideHint::order(order.side),
            price,
            quantity,
            time: order.time,
            seq: None,
        })]
    }
}
