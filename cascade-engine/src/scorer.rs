use crate::{
    context::{MarketContextSnapshot, OI_HORIZONS_MINUTES},
    velocity::{VelocitySnapshot, WindowSpec},
};
use cascade_data::model::symbol::SymbolId;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Discrete cascade severity ladder.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Default,
    Display,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    #[display("NONE")]
    None,
    #[display("LOW")]
    Low,
    #[display("MODERATE")]
    Moderate,
    #[display("HIGH")]
    High,
    #[display("EXTREME")]
    Extreme,
}

/// Relative weight of each sub-score. Need not sum to one: the composite is normalised by
/// the total weight of the sub-scores in use.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub velocity: f64,
    pub acceleration: f64,
    pub correlation: f64,
    pub market: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            velocity: 0.25,
            acceleration: 0.20,
            correlation: 0.25,
            market: 0.30,
        }
    }
}

/// Minimum composite score of each severity above [`Severity::None`].
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    pub extreme: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low: 0.20,
            moderate: 0.35,
            high: 0.55,
            extreme: 0.75,
        }
    }
}

impl SeverityThresholds {
    pub fn classify(&self, score: f64) -> Severity {
        match score {
            score if score >= self.extreme => Severity::Extreme,
            score if score >= self.high => Severity::High,
            score if score >= self.moderate => Severity::Moderate,
            score if score >= self.low => Severity::Low,
            _ => Severity::None,
        }
    }

    /// Thresholds must be strictly increasing & within (0, 1].
    pub fn is_monotone(&self) -> bool {
        0.0 < self.low
            && self.low < self.moderate
            && self.moderate < self.high
            && self.high < self.extreme
            && self.extreme <= 1.0
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Window per-exchange activity is compared over.
    pub window_ms: u64,
    /// Number of active exchanges at which breadth saturates.
    pub saturation_exchanges: usize,
    /// Liquidations across all exchanges needed for the full correlation sub-score.
    pub min_events: u64,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            saturation_exchanges: 3,
            min_events: 4,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Open interest drop (%) saturating each of the 1/5/15/60 minute horizons.
    pub oi_drop_saturation_pct: [f64; 4],
    /// Absolute funding rate considered extreme.
    pub funding_extreme: f64,
    /// Funding sub-score floor when funding just changed sign.
    pub funding_flip_score: f64,
    /// Context older than this is excluded from scoring.
    pub staleness_ms: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            oi_drop_saturation_pct: [1.0, 2.0, 4.0, 8.0],
            funding_extreme: 0.0005,
            funding_flip_score: 0.6,
            staleness_ms: 180_000,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScorerSettings {
    pub weights: ScoreWeights,
    pub thresholds: SeverityThresholds,
    pub correlation: CorrelationSettings,
    pub market: MarketSettings,
}

/// Normalised [0, 1] inputs of a composite score.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize)]
pub struct SubScores {
    pub velocity: f64,
    pub acceleration: f64,
    pub correlation: f64,
    /// `None` when market context is missing or stale & its weight was redistributed.
    pub market: Option<f64>,
}

impl SubScores {
    /// Weighted mean of the sub-scores in use, in [0, 1].
    ///
    /// An excluded market sub-score removes its weight from both numerator & denominator,
    /// which spreads it over the remaining sub-scores in proportion to their weights.
    pub fn combine(&self, weights: &ScoreWeights) -> f64 {
        let mut weighted = weights.velocity * clamp_unit(self.velocity)
            + weights.acceleration * clamp_unit(self.acceleration)
            + weights.correlation * clamp_unit(self.correlation);
        let mut total = weights.velocity + weights.acceleration + weights.correlation;

        if let Some(market) = self.market {
            weighted += weights.market * clamp_unit(market);
            total += weights.market;
        }

        if total <= 0.0 {
            return 0.0;
        }
        clamp_unit(weighted / total)
    }
}

/// Scored cascade risk for one symbol at one point in time.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct CascadeSignal {
    pub symbol: SymbolId,
    pub symbol_name: SmolStr,
    pub score: f64,
    pub severity: Severity,
    pub sub_scores: SubScores,
    /// Window with the highest velocity sub-score.
    pub trigger_window_ms: u64,
    pub context_fresh: bool,
    pub emitted_ms: u64,
}

/// Combines velocity, acceleration, cross-exchange correlation & market context into one
/// bounded score per symbol.
#[derive(Debug, Clone)]
pub struct CascadeScorer {
    settings: ScorerSettings,
    windows: Vec<WindowSpec>,
}

impl CascadeScorer {
    pub fn new(settings: ScorerSettings, windows: Vec<WindowSpec>) -> Self {
        Self { settings, windows }
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    pub fn score(
        &self,
        name: SmolStr,
        velocity: &VelocitySnapshot,
        context: Option<&MarketContextSnapshot>,
        now_ms: u64,
    ) -> CascadeSignal {
        let (velocity_score, trigger_window_ms) = self.velocity_score(velocity);

        let fresh_context = context
            .filter(|context| context.is_fresh(now_ms, self.settings.market.staleness_ms));

        let sub_scores = SubScores {
            velocity: velocity_score,
            acceleration: self.acceleration_score(velocity),
            correlation: self.correlation_score(velocity),
            market: fresh_context.map(|context| self.market_score(context)),
        };

        let score = sub_scores.combine(&self.settings.weights);

        CascadeSignal {
            symbol: velocity.symbol,
            symbol_name: name,
            score,
            severity: self.settings.thresholds.classify(score),
            sub_scores,
            trigger_window_ms,
            context_fresh: fresh_context.is_some(),
            emitted_ms: now_ms,
        }
    }

    /// Highest per-window velocity sub-score & the window it came from.
    pub fn velocity_score(&self, velocity: &VelocitySnapshot) -> (f64, u64) {
        let mut best = (0.0, self.windows.first().map_or(0, |spec| spec.window_ms));

        for (reading, spec) in velocity.windows.iter().zip(self.windows.iter()) {
            let score = saturate(reading.sample.events_per_sec, spec.count_saturation)
                .max(saturate(reading.sample.notional_per_sec, spec.notional_saturation));
            if score > best.0 {
                best = (score, spec.window_ms);
            }
        }

        best
    }

    /// Highest per-window acceleration sub-score. Decelerating windows score zero.
    pub fn acceleration_score(&self, velocity: &VelocitySnapshot) -> f64 {
        velocity
            .windows
            .iter()
            .zip(self.windows.iter())
            .filter_map(|(reading, spec)| {
                let accel = reading.acceleration?;
                Some(
                    saturate(accel.events_per_sec2, spec.count_accel_saturation()).max(saturate(
                        accel.notional_per_sec2,
                        spec.notional_accel_saturation(),
                    )),
                )
            })
            .fold(0.0, f64::max)
    }

    /// Breadth of exchanges liquidating the symbol, discounted when one exchange dominates
    /// the notional & when there is too little activity to call it a cluster.
    pub fn correlation_score(&self, velocity: &VelocitySnapshot) -> f64 {
        let settings = &self.settings.correlation;

        let active = velocity
            .exchanges
            .iter()
            .filter(|(_, totals)| !totals.is_empty())
            .map(|(_, totals)| totals)
            .collect::<Vec<_>>();

        let exchanges = active.len();
        if exchanges < 2 {
            return 0.0;
        }

        let breadth = saturate(
            (exchanges - 1) as f64,
            settings.saturation_exchanges.saturating_sub(1).max(1) as f64,
        );

        let total_notional = active
            .iter()
            .map(|totals| totals.notional_usd() as f64)
            .sum::<f64>();
        let total_count = active.iter().map(|totals| totals.count()).sum::<u64>();

        let concentration = if total_notional > 0.0 {
            active
                .iter()
                .map(|totals| (totals.notional_usd() as f64 / total_notional).powi(2))
                .sum::<f64>()
        } else {
            active
                .iter()
                .map(|totals| (totals.count() as f64 / total_count as f64).powi(2))
                .sum::<f64>()
        };
        let even = 1.0 / exchanges as f64;
        let dispersion = clamp_unit((1.0 - concentration) / (1.0 - even));

        let intensity = saturate(total_count as f64, settings.min_events.max(1) as f64);

        clamp_unit(breadth * (0.5 + 0.5 * dispersion) * intensity)
    }

    /// Open interest drop blended with funding extremity, amplified when both are present.
    pub fn market_score(&self, context: &MarketContextSnapshot) -> f64 {
        let settings = &self.settings.market;

        let oi_drop = context
            .oi_change_pct
            .iter()
            .zip(settings.oi_drop_saturation_pct.iter())
            .take(OI_HORIZONS_MINUTES.len())
            .filter_map(|(change, saturation)| change.map(|change| saturate(-change, *saturation)))
            .fold(0.0, f64::max);

        let mut funding = context
            .funding_rate
            .map_or(0.0, |rate| saturate(rate.abs(), settings.funding_extreme));
        if context.funding_flipped {
            funding = funding.max(settings.funding_flip_score);
        }

        clamp_unit((0.6 * oi_drop + 0.4 * funding) * (1.0 + oi_drop * funding))
    }
}

/// `value / saturation` clamped to [0, 1]. Non finite values & saturations score zero.
pub fn saturate(value: f64, saturation: f64) -> f64 {
    if !value.is_finite() || !saturation.is_finite() || saturation <= 0.0 {
        return 0.0;
    }
    clamp_unit(value / saturation)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::FundingTrend,
        state::window::WindowTotals,
        velocity::{Acceleration, VelocitySample, WindowReading, default_windows},
    };
    use cascade_data::model::{ExchangeId, Side};

    fn scorer() -> CascadeScorer {
        CascadeScorer::new(ScorerSettings::default(), default_windows())
    }

    fn totals(count: u64, notional_usd: u64) -> WindowTotals {
        let mut totals = WindowTotals::default();
        for _ in 0..count {
            totals.add(Side::Long, notional_usd / count.max(1));
        }
        totals
    }

    fn snapshot(exchanges: Vec<(ExchangeId, WindowTotals)>) -> VelocitySnapshot {
        VelocitySnapshot {
            symbol: SymbolId(0),
            clock_ms: 0,
            windows: vec![],
            exchanges,
        }
    }

    /// Deterministic values in [0, 1].
    fn unit_values(count: usize) -> Vec<f64> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..count)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 11) as f64 / (1_u64 << 53) as f64
            })
            .collect()
    }

    #[test]
    fn test_severity_classify() {
        struct TestCase {
            input: f64,
            expected: Severity,
        }

        let thresholds = SeverityThresholds::default();
        let tests = vec![
            TestCase {
                // TC0: quiet
                input: 0.0,
                expected: Severity::None,
            },
            TestCase {
                // TC1: just below low
                input: 0.199,
                expected: Severity::None,
            },
            TestCase {
                // TC2: boundary is inclusive
                input: 0.35,
                expected: Severity::Moderate,
            },
            TestCase {
                // TC3: high
                input: 0.6,
                expected: Severity::High,
            },
            TestCase {
                // TC4: maximum
                input: 1.0,
                expected: Severity::Extreme,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(thresholds.classify(test.input), test.expected, "TC{} failed", index);
        }

        assert!(thresholds.is_monotone());
        assert!(Severity::Low < Severity::Moderate && Severity::High < Severity::Extreme);
        assert_eq!(Severity::Moderate.to_string(), "MODERATE");
    }

    #[test]
    fn test_combined_score_is_bounded() {
        let weights = ScoreWeights::default();
        let values = unit_values(4 * 500);

        for chunk in values.chunks(4) {
            for market in [Some(chunk[3]), None] {
                let scores = SubScores {
                    velocity: chunk[0],
                    acceleration: chunk[1],
                    correlation: chunk[2],
                    market,
                };
                let score = scores.combine(&weights);
                assert!((0.0..=1.0).contains(&score), "{scores:?} scored {score}");
            }
        }

        let extremes = SubScores {
            velocity: 1.0,
            acceleration: 1.0,
            correlation: 1.0,
            market: Some(1.0),
        };
        assert!((extremes.combine(&weights) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stale_market_weight_is_redistributed() {
        let weights = ScoreWeights::default();
        let values = unit_values(3 * 100);

        for chunk in values.chunks(3) {
            let scores = SubScores {
                velocity: chunk[0],
                acceleration: chunk[1],
                correlation: chunk[2],
                market: None,
            };

            // zero the market weight & renormalise the rest to sum to one
            let remaining = weights.velocity + weights.acceleration + weights.correlation;
            let expected = (weights.velocity / remaining) * chunk[0]
                + (weights.acceleration / remaining) * chunk[1]
                + (weights.correlation / remaining) * chunk[2];

            assert!((scores.combine(&weights) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_score_excludes_stale_context() {
        let scorer = scorer();
        let velocity = snapshot(vec![]);
        let mut context = MarketContextSnapshot::neutral(SmolStr::new("BTC"), 1_000);
        context.funding_rate = Some(0.001);

        let fresh = scorer.score(SmolStr::new("BTC"), &velocity, Some(&context), 1_000 + 180_000);
        assert!(fresh.context_fresh);
        assert_eq!(fresh.sub_scores.market, Some(0.4));

        let stale = scorer.score(SmolStr::new("BTC"), &velocity, Some(&context), 1_000 + 180_001);
        assert!(!stale.context_fresh);
        assert_eq!(stale.sub_scores.market, None);

        let missing = scorer.score(SmolStr::new("BTC"), &velocity, None, 0);
        assert!(!missing.context_fresh);
        assert_eq!(missing.severity, Severity::None);
    }

    #[test]
    fn test_velocity_score_picks_trigger_window() {
        let scorer = scorer();
        let reading = |window_ms: u64, events_per_sec: f64| WindowReading {
            window_ms,
            sample: VelocitySample {
                events_per_sec,
                ..VelocitySample::default()
            },
            acceleration: None,
        };

        let mut velocity = snapshot(vec![]);
        velocity.windows = vec![
            reading(100, 10.0),
            reading(1_000, 5.0),
            reading(5_000, 8.0),
            reading(30_000, 0.5),
            reading(60_000, 0.3),
            reading(300_000, 0.1),
        ];

        let (score, window_ms) = scorer.velocity_score(&velocity);
        assert!((score - 0.8).abs() < 1e-12);
        assert_eq!(window_ms, 5_000);
    }

    #[test]
    fn test_acceleration_score_ignores_deceleration() {
        let scorer = scorer();
        let reading = |events_per_sec2: f64| WindowReading {
            window_ms: 100,
            sample: VelocitySample::default(),
            acceleration: Some(Acceleration {
                events_per_sec2,
                notional_per_sec2: 0.0,
            }),
        };

        let mut velocity = snapshot(vec![]);
        velocity.windows = vec![reading(-1e9)];
        assert_eq!(scorer.acceleration_score(&velocity), 0.0);

        velocity.windows = vec![reading(2_000.0)];
        assert!((scorer.acceleration_score(&velocity) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_score() {
        struct TestCase {
            exchanges: Vec<(ExchangeId, WindowTotals)>,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: single exchange burst scores nothing
                exchanges: vec![(ExchangeId::BinanceFuturesUsd, totals(50, 10_000_000))],
                expected: 0.0,
            },
            TestCase {
                // TC1: two exchanges, even split
                exchanges: vec![
                    (ExchangeId::BinanceFuturesUsd, totals(5, 1_000_000)),
                    (ExchangeId::Okx, totals(5, 1_000_000)),
                ],
                expected: 0.5,
            },
            TestCase {
                // TC2: three exchanges, even split saturates
                exchanges: vec![
                    (ExchangeId::BinanceFuturesUsd, totals(2, 100_000)),
                    (ExchangeId::Okx, totals(2, 100_000)),
                    (ExchangeId::BybitPerpetualsUsd, totals(2, 100_000)),
                ],
                expected: 1.0,
            },
            TestCase {
                // TC3: two exchanges, one dominating the notional
                exchanges: vec![
                    (ExchangeId::BinanceFuturesUsd, totals(5, 9_900_000)),
                    (ExchangeId::Hyperliquid, totals(5, 100_000)),
                ],
                expected: 0.5 * (0.5 + 0.5 * (1.0 - (0.99_f64.powi(2) + 0.01_f64.powi(2))) / 0.5),
            },
            TestCase {
                // TC4: too few liquidations to call a cluster
                exchanges: vec![
                    (ExchangeId::BinanceFuturesUsd, totals(1, 100_000)),
                    (ExchangeId::Okx, totals(1, 100_000)),
                ],
                expected: 0.25,
            },
            TestCase {
                // TC5: idle exchanges are ignored
                exchanges: vec![
                    (ExchangeId::BinanceFuturesUsd, totals(5, 1_000_000)),
                    (ExchangeId::Okx, WindowTotals::default()),
                ],
                expected: 0.0,
            },
        ];

        let scorer = scorer();
        for (index, test) in tests.into_iter().enumerate() {
            let actual = scorer.correlation_score(&snapshot(test.exchanges));
            assert!(
                (actual - test.expected).abs() < 1e-9,
                "TC{} failed: {} != {}",
                index,
                actual,
                test.expected
            );
        }
    }

    #[test]
    fn test_market_score() {
        struct TestCase {
            oi_change_pct: [Option<f64>; 4],
            funding_rate: Option<f64>,
            funding_flipped: bool,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: neutral
                oi_change_pct: [Some(0.0); 4],
                funding_rate: Some(0.0),
                funding_flipped: false,
                expected: 0.0,
            },
            TestCase {
                // TC1: rising open interest is not a drop
                oi_change_pct: [Some(3.0), Some(5.0), None, None],
                funding_rate: None,
                funding_flipped: false,
                expected: 0.0,
            },
            TestCase {
                // TC2: 1% drop in a minute saturates open interest alone
                oi_change_pct: [Some(-1.0), None, None, None],
                funding_rate: Some(0.0),
                funding_flipped: false,
                expected: 0.6,
            },
            TestCase {
                // TC3: drop & extreme funding amplify to the maximum
                oi_change_pct: [Some(-0.5), Some(-2.0), None, None],
                funding_rate: Some(-0.0008),
                funding_flipped: false,
                expected: 1.0,
            },
            TestCase {
                // TC4: flip alone
                oi_change_pct: [None; 4],
                funding_rate: Some(0.000_01),
                funding_flipped: true,
                expected: 0.4 * 0.6,
            },
        ];

        let scorer = scorer();
        for (index, test) in tests.into_iter().enumerate() {
            let context = MarketContextSnapshot {
                symbol: SmolStr::new("BTC"),
                updated_ms: 0,
                open_interest: None,
                open_interest_usd: None,
                oi_change_pct: test.oi_change_pct,
                funding_rate: test.funding_rate,
                funding_trend: FundingTrend::Flat,
                funding_flipped: test.funding_flipped,
            };
            let actual = scorer.market_score(&context);
            assert!(
                (actual - test.expected).abs() < 1e-9,
                "TC{} failed: {} != {}",
                index,
                actual,
                test.expected
            );
        }
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(5.0, 10.0), 0.5);
        assert_eq!(saturate(50.0, 10.0), 1.0);
        assert_eq!(saturate(-5.0, 10.0), 0.0);
        assert_eq!(saturate(5.0, 0.0), 0.0);
        assert_eq!(saturate(f64::NAN, 10.0), 0.0);
        assert_eq!(saturate(f64::INFINITY, 10.0), 0.0);
    }
}
