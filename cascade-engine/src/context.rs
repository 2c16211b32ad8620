use cascade_data::{
    context::{MarketContextProvider, MarketReading},
    error::DataError,
};
use cascade_integration::backoff::duration_ms;
use derive_more::Display;
use fnv::FnvHashMap;
use futures::{Stream, stream};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::VecDeque, time::Duration};
use tokio::time::MissedTickBehavior;

/// Horizons, in minutes, open interest change is tracked over.
pub const OI_HORIZONS_MINUTES: [u64; 4] = [1, 5, 15, 60];

/// Fraction of a horizon a reference reading may fall short by, so a 1 minute change is
/// still available when polls land a little under a minute apart.
const HORIZON_TOLERANCE: f64 = 0.1;

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextSettings {
    pub enabled: bool,
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Override of the provider's REST endpoint.
    pub url: Option<String>,
    /// Symbols to poll. Empty polls the monitored symbol list.
    pub symbols: Vec<SmolStr>,
    /// Funding moves smaller than this are considered flat.
    pub funding_flat_epsilon: f64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            url: None,
            symbols: Vec::new(),
            funding_flat_epsilon: 0.000_01,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingTrend {
    #[display("rising")]
    Rising,
    #[display("falling")]
    Falling,
    #[default]
    #[display("flat")]
    Flat,
}

/// Latest market context for one symbol.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct MarketContextSnapshot {
    pub symbol: SmolStr,
    /// Time of the reading this snapshot was derived from.
    pub updated_ms: u64,
    pub open_interest: Option<f64>,
    pub open_interest_usd: Option<f64>,
    /// Open interest % change over each of [`OI_HORIZONS_MINUTES`], `None` until enough
    /// history exists.
    pub oi_change_pct: [Option<f64>; 4],
    pub funding_rate: Option<f64>,
    pub funding_trend: FundingTrend,
    /// Funding changed sign since the previous reading.
    pub funding_flipped: bool,
}

impl MarketContextSnapshot {
    /// Flat open interest & zero funding.
    pub fn neutral(symbol: SmolStr, updated_ms: u64) -> Self {
        Self {
            symbol,
            updated_ms,
            open_interest: None,
            open_interest_usd: None,
            oi_change_pct: [Some(0.0); 4],
            funding_rate: Some(0.0),
            funding_trend: FundingTrend::Flat,
            funding_flipped: false,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.updated_ms)
    }

    pub fn is_fresh(&self, now_ms: u64, staleness_ms: u64) -> bool {
        self.age_ms(now_ms) <= staleness_ms
    }
}

#[derive(Debug, Default)]
struct ContextHistory {
    /// (time_ms, open interest), oldest first.
    open_interest: VecDeque<(u64, f64)>,
    last_funding: Option<f64>,
}

/// Turns raw [`MarketReading`]s into [`MarketContextSnapshot`]s by keeping an hour of open
/// interest history & the previous funding rate per symbol.
#[derive(Debug)]
pub struct MarketContextTracker {
    funding_flat_epsilon: f64,
    history: FnvHashMap<SmolStr, ContextHistory>,
}

impl MarketContextTracker {
    pub fn new(funding_flat_epsilon: f64) -> Self {
        Self {
            funding_flat_epsilon,
            history: FnvHashMap::default(),
        }
    }

    pub fn update(&mut self, reading: &MarketReading) -> MarketContextSnapshot {
        let time_ms = u64::try_from(reading.time.timestamp_millis()).unwrap_or_default();
        let history = self.history.entry(reading.symbol.clone()).or_default();

        // Base units are preferred: USD open interest also moves with price
        let open_interest = reading.open_interest.or(reading.open_interest_usd);
        if let Some(value) = open_interest {
            match history.open_interest.back_mut() {
                Some(back) if back.0 >= time_ms => *back = (back.0, value),
                _ => history.open_interest.push_back((time_ms, value)),
            }
        }

        let retention_ms = (OI_HORIZONS_MINUTES[OI_HORIZONS_MINUTES.len() - 1] + 5) * 60_000;
        while let Some(front) = history.open_interest.front() {
            if front.0 + retention_ms < time_ms {
                history.open_interest.pop_front();
            } else {
                break;
            }
        }

        let oi_change_pct = OI_HORIZONS_MINUTES.map(|minutes| {
            open_interest.and_then(|current| {
                percent_change(&history.open_interest, time_ms, minutes * 60_000, current)
            })
        });

        let (funding_trend, funding_flipped) =
            match (history.last_funding, reading.funding_rate) {
                (Some(previous), Some(current)) => (
                    trend(previous, current, self.funding_flat_epsilon),
                    previous * current < 0.0,
                ),
                _ => (FundingTrend::Flat, false),
            };
        if reading.funding_rate.is_some() {
            history.last_funding = reading.funding_rate;
        }

        MarketContextSnapshot {
            symbol: reading.symbol.clone(),
            updated_ms: time_ms,
            open_interest: reading.open_interest,
            open_interest_usd: reading.open_interest_usd,
            oi_change_pct,
            funding_rate: reading.funding_rate,
            funding_trend,
            funding_flipped,
        }
    }

    /// Get number of symbols with history
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// % change of `current` versus the newest reading at least one horizon (less tolerance)
/// older than `now_ms`.
fn percent_change(
    history: &VecDeque<(u64, f64)>,
    now_ms: u64,
    horizon_ms: u64,
    current: f64,
) -> Option<f64> {
    let min_age_ms = (horizon_ms as f64 * (1.0 - HORIZON_TOLERANCE)) as u64;
    let (_, reference) = history
        .iter()
        .rev()
        .find(|(time_ms, _)| now_ms.saturating_sub(*time_ms) >= min_age_ms)?;

    (*reference > 0.0).then(|| (current - reference) / reference * 100.0)
}

fn trend(previous: f64, current: f64, epsilon: f64) -> FundingTrend {
    match current - previous {
        delta if delta > epsilon => FundingTrend::Rising,
        delta if delta < -epsilon => FundingTrend::Falling,
        _ => FundingTrend::Flat,
    }
}

/// Poll `provider` for `symbols` every `interval`, yielding every poll result.
///
/// Failures are yielded rather than ending the stream: market context is optional & the
/// consumer carries on in degraded mode.
pub fn context_stream<Provider>(
    provider: Provider,
    symbols: Vec<SmolStr>,
    interval: Duration,
) -> impl Stream<Item = Result<Vec<MarketReading>, DataError>> + Send
where
    Provider: MarketContextProvider + 'static,
{
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(
        (provider, symbols, timer),
        |(provider, symbols, mut timer)| async move {
            timer.tick().await;
            let result = provider.fetch(&symbols).await;
            Some((result, (provider, symbols, timer)))
        },
    )
}
