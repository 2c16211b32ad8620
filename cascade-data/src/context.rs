use crate::error::DataError;
use async_trait::async_trait;
use cascade_integration::error::SocketError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::{fmt::Debug, time::Duration};
use tracing::warn;
use url::Url;

/// [`BinanceContextProvider`] USD-M futures REST base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/general-info>
pub const BASE_URL_BINANCE_FUTURES_REST: &str = "https://fapi.binance.com";

/// One open interest & funding observation for a symbol.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarketReading {
    /// Base asset symbol (eg/ "BTC").
    pub symbol: SmolStr,
    pub time: DateTime<Utc>,
    /// Open interest in base asset units.
    pub open_interest: Option<f64>,
    /// Open interest valued at the mark price, in USD.
    pub open_interest_usd: Option<f64>,
    /// Current (or last settled) funding rate, eg/ 0.0001 is 1bp per interval.
    pub funding_rate: Option<f64>,
}

/// Source of [`MarketReading`]s polled by the market context service.
#[async_trait]
pub trait MarketContextProvider
where
    Self: Debug + Send + Sync,
{
    /// Fetch the latest reading for every requested base asset symbol. Symbols that fail are
    /// omitted; an error means nothing could be fetched.
    async fn fetch(&self, symbols: &[SmolStr]) -> Result<Vec<MarketReading>, DataError>;
}

/// Binance USD-M futures open interest & premium index REST poller.
#[derive(Debug, Clone)]
pub struct BinanceContextProvider {
    client: reqwest::Client,
    base_url: Url,
}

/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Open-Interest>
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOpenInterest {
    #[serde(deserialize_with = "cascade_integration::de::de_str")]
    pub open_interest: f64,
    pub symbol: SmolStr,
    #[serde(deserialize_with = "cascade_integration::de::de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Mark-Price>
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    pub symbol: SmolStr,
    #[serde(deserialize_with = "cascade_integration::de::de_str")]
    pub mark_price: f64,
    #[serde(deserialize_with = "cascade_integration::de::de_str")]
    pub last_funding_rate: f64,
}

impl BinanceContextProvider {
    pub fn new(base_url: Option<&str>) -> Result<Self, DataError> {
        let base_url = Url::parse(base_url.unwrap_or(BASE_URL_BINANCE_FUTURES_REST))
            .map_err(|error| DataError::ContextUnavailable(error.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| DataError::ContextUnavailable(error.to_string()))?;

        Ok(Self { client, base_url })
    }

    async fn get<T>(&self, path: &str, market: &str) -> Result<T, SocketError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let response = self
            .client
            .get(url)
            .query(&[("symbol", market)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SocketError::HttpResponse {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn fetch_one(&self, symbol: &SmolStr) -> Result<MarketReading, SocketError> {
        let market = format_smolstr!("{symbol}USDT");

        let (open_interest, premium) = futures::try_join!(
            self.get::<BinanceOpenInterest>("/fapi/v1/openInterest", &market),
            self.get::<BinancePremiumIndex>("/fapi/v1/premiumIndex", &market),
        )?;

        Ok(reading_from(symbol.clone(), open_interest, premium))
    }
}

fn reading_from(
    symbol: SmolStr,
    open_interest: BinanceOpenInterest,
    premium: BinancePremiumIndex,
) -> MarketReading {
    MarketReading {
        symbol,
        time: open_interest.time,
        open_interest: Some(open_interest.open_interest),
        open_interest_usd: Some(open_interest.open_interest * premium.mark_price),
        funding_rate: Some(premium.last_funding_rate),
    }
}

#[async_trait]
impl MarketContextProvider for BinanceContextProvider {
    async fn fetch(&self, symbols: &[SmolStr]) -> Result<Vec<MarketReading>, DataError> {
        let results =
            futures::future::join_all(symbols.iter().map(|symbol| self.fetch_one(symbol))).await;

        let mut readings = Vec::with_capacity(symbols.len());
        let mut last_error = None;

        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(reading) => readings.push(reading),
                Err(error) => {
                    warn!(%symbol, %error, "failed to fetch market context");
                    last_error = Some(error);
                }
            }
        }

        match (readings.is_empty(), last_error) {
            (true, Some(error)) => Err(DataError::ContextUnavailable(error.to_string())),
            _ => Ok(readings),
        }
    }
}
