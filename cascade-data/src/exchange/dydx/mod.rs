use self::trade::{DydxTrade, DydxTradeKind, DydxTrades};
use crate::{
    adapter::poll::Poller,
    exchange::{
        LiquidationIter, RawLiquidation, resolve_url, seq_from_str,
        side::{SideDetector, SideHint},
    },
    model::ExchangeId,
};
use async_trait::async_trait;
use cascade_integration::error::SocketError;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use smol_str::{SmolStr, format_smolstr};
use tracing::warn;
use url::Url;

/// Public trade types for [`DydxV4`].
pub mod trade;

/// [`DydxV4`] mainnet indexer url.
///
/// See docs: <https://docs.dydx.exchange/api_integration-indexer/indexer_api>
pub const BASE_URL_DYDX_V4: &str = "https://indexer.dydx.trade";

/// Default number of trades requested per market per poll.
pub const DEFAULT_TRADE_LIMIT: u32 = 100;

/// Last observed position in a market's trade history.
#[derive(Clone, Eq, PartialEq, Debug)]
struct TradeCursor {
    time: DateTime<Utc>,
    ids: Vec<SmolStr>,
}

/// [`DydxV4`] exchange, polled over the indexer REST API.
///
/// The first poll of each market only records a cursor, so historical liquidations are not
/// replayed as if they were live.
#[derive(Clone, Debug)]
pub struct DydxV4 {
    url: Option<String>,
    limit: u32,
    cursors: FnvHashMap<SmolStr, TradeCursor>,
}

impl Default for DydxV4 {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DydxV4 {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            limit: DEFAULT_TRADE_LIMIT,
            cursors: FnvHashMap::default(),
        }
    }

    /// Venue market for a base asset symbol (eg/ "BTC" -> "BTC-USD").
    pub fn market(symbol: &str) -> SmolStr {
        format_smolstr!("{symbol}-USD")
    }

    /// Keep the trades not seen by a previous poll & advance the market cursor.
    fn fresh(&mut self, market: &SmolStr, trades: Vec<DydxTrade>) -> Vec<DydxTrade> {
        let Some(newest) = trades.iter().map(|trade| trade.created_at).max() else {
            return vec![];
        };

        let newest_ids = trades
            .iter()
            .filter(|trade| trade.created_at == newest)
            .map(|trade| trade.id.clone())
            .collect::<Vec<_>>();

        let fresh = match self.cursors.get(market) {
            None => vec![],
            Some(cursor) => trades
                .into_iter()
                .filter(|trade| {
                    trade.created_at > cursor.time
                        || (trade.created_at == cursor.time && !cursor.ids.contains(&trade.id))
                })
                .collect(),
        };

        let cursor = self
            .cursors
            .entry(market.clone())
            .or_insert_with(|| TradeCursor {
                time: newest,
                ids: vec![],
            });

        if newest > cursor.time {
            *cursor = TradeCursor {
                time: newest,
                ids: newest_ids,
            };
        } else if newest == cursor.time {
            for id in newest_ids {
                if !cursor.ids.contains(&id) {
                    cursor.ids.push(id);
                }
            }
        }

        fresh
    }
}

#[async_trait]
impl Poller for DydxV4 {
    const ID: ExchangeId = ExchangeId::DydxV4;

    fn url(&self) -> Result<Url, SocketError> {
        resolve_url(self.url.as_deref(), BASE_URL_DYDX_V4)
    }

    fn side_detector(&self) -> SideDetector {
        SideDetector::OrderSide
    }

    async fn poll(
        &mut self,
        client: &reqwest::Client,
        base_url: &Url,
        symbols: &[SmolStr],
    ) -> Result<LiquidationIter, SocketError> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let market = Self::market(symbol);
            let trades = fetch_trades(client, base_url, &market, self.limit).await;
            results.push((market, trades));
        }

        self.collect(results)
    }
}

impl DydxV4 {
    /// Merge per market responses. Failed markets keep their cursor & are logged, so one bad
    /// market never discards the others. Errors only if every market failed.
    fn collect(
        &mut self,
        results: Vec<(SmolStr, Result<Vec<DydxTrade>, SocketError>)>,
    ) -> Result<LiquidationIter, SocketError> {
        let mut liquidations = Vec::new();
        let mut succeeded = false;
        let mut last_error = None;

        for (market, result) in results {
            let trades = match result {
                Ok(trades) => trades,
                Err(error) => {
                    warn!(%market, %error, "dydx trade poll failed for market");
                    last_error = Some(error);
                    continue;
                }
            };
            succeeded = true;

            liquidations.extend(
                self.fresh(&market, trades)
                    .into_iter()
                    .filter(|trade| trade.kind == DydxTradeKind::Liquidated)
                    .map(|trade| {
                        Ok(RawLiquidation {
                            seq: Some(seq_from_str(&trade.id)),
                            market: market.clone(),
                            hint: SideHint::order(trade.side),
                            price: trade.price,
                            quantity: trade.size,
                            time: trade.created_at,
                        })
                    }),
            );
        }

        match (succeeded, last_error) {
            (false, Some(error)) => Err(error),
            _ => Ok(liquidations),
        }
    }
}

async fn fetch_trades(
    client: &reqwest::Client,
    base_url: &Url,
    market: &str,
    limit: u32,
) -> Result<Vec<DydxTrade>, SocketError> {
    let url = base_url.join(&format!("/v4/trades/perpetualMarket/{market}"))?;

    let response = client.get(url).query(&[("limit", limit)]).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SocketError::HttpResponse {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<DydxTrades>().await?.trades)
}
