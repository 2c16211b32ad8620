use crate::state::{
    HotTierSettings, SymbolRegistry, SymbolState,
    window::{SlidingWindow, WindowTotals},
};
use cascade_data::model::{ExchangeId, event::LiquidationEvent, symbol::SymbolId};
use cascade_integration::backoff::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of samples taken per window length. A new sample slot starts every
/// `window / SAMPLES_PER_WINDOW`, which is also the minimum acceleration time step.
pub const SAMPLES_PER_WINDOW: u64 = 4;

/// Extra liquidations per sample step that saturate a window's acceleration when no explicit
/// saturation is configured.
pub const ACCEL_SATURATION_EVENTS: f64 = 10.0;

/// One velocity window & the thresholds that saturate its sub-scores.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct WindowSpec {
    pub window_ms: u64,
    /// Liquidations per second mapping to a velocity sub-score of 1.0.
    pub count_saturation: f64,
    /// USD per second mapping to a velocity sub-score of 1.0.
    pub notional_saturation: f64,
    /// Liquidations per second² mapping to an acceleration sub-score of 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_accel_saturation: Option<f64>,
    /// USD per second² mapping to an acceleration sub-score of 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notional_accel_saturation: Option<f64>,
}

impl WindowSpec {
    pub fn new(window_ms: u64, count_saturation: f64, notional_saturation: f64) -> Self {
        Self {
            window_ms,
            count_saturation,
            notional_saturation,
            count_accel_saturation: None,
            notional_accel_saturation: None,
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_ms as f64 / 1000.0
    }

    /// Configured count acceleration saturation, else [`ACCEL_SATURATION_EVENTS`] extra
    /// liquidations within one sample step.
    pub fn count_accel_saturation(&self) -> f64 {
        self.count_accel_saturation.unwrap_or_else(|| {
            let secs = self.window_secs().max(0.001);
            ACCEL_SATURATION_EVENTS * SAMPLES_PER_WINDOW as f64 / (secs * secs)
        })
    }

    /// Configured notional acceleration saturation, else the count saturation scaled by the
    /// window's notional per liquidation ratio.
    pub fn notional_accel_saturation(&self) -> f64 {
        self.notional_accel_saturation.unwrap_or_else(|| {
            self.count_accel_saturation() * self.notional_saturation
                / self.count_saturation.max(f64::EPSILON)
        })
    }
}

/// Default window set: 100ms, 1s, 5s, 30s, 1m & 5m.
pub fn default_windows() -> Vec<WindowSpec> {
    vec![
        WindowSpec::new(100, 50.0, 50_000_000.0),
        WindowSpec::new(1_000, 20.0, 10_000_000.0),
        WindowSpec::new(5_000, 10.0, 1_000_000.0),
        WindowSpec::new(30_000, 5.0, 300_000.0),
        WindowSpec::new(60_000, 3.0, 200_000.0),
        WindowSpec::new(300_000, 1.0, 50_000.0),
    ]
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VelocitySettings {
    pub windows: Vec<WindowSpec>,
    /// Periodic decay trails the wall clock by this much. Liquidations stamped within the lag
    /// still land in windows a tick has already advanced past.
    #[serde(with = "duration_ms", rename = "tick_lag_ms")]
    pub tick_lag: Duration,
}

impl Default for VelocitySettings {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            tick_lag: Duration::from_secs(2),
        }
    }
}

/// Velocity of one window at a point in time.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize)]
pub struct VelocitySample {
    pub time_ms: u64,
    pub totals: WindowTotals,
    pub events_per_sec: f64,
    pub notional_per_sec: f64,
}

/// Discrete derivative of velocity between two samples of the same window.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize)]
pub struct Acceleration {
    pub events_per_sec2: f64,
    pub notional_per_sec2: f64,
}

impl Acceleration {
    /// Derivative from `previous` to `latest`, with the time step floored at `min_step_ms`.
    pub fn between(previous: &VelocitySample, latest: &VelocitySample, min_step_ms: u64) -> Self {
        let step_ms = latest
            .time_ms
            .saturating_sub(previous.time_ms)
            .max(min_step_ms)
            .max(1);
        let step_secs = step_ms as f64 / 1000.0;

        Self {
            events_per_sec2: (latest.events_per_sec - previous.events_per_sec) / step_secs,
            notional_per_sec2: (latest.notional_per_sec - previous.notional_per_sec) / step_secs,
        }
    }
}

/// A [`SlidingWindow`] plus its two most recent [`VelocitySample`]s.
///
/// Samples falling in the same `window / SAMPLES_PER_WINDOW` slot replace the latest sample;
/// a sample in a new slot shifts the latest into `previous`.
#[derive(Debug, Clone)]
pub struct TrackedWindow {
    window: SlidingWindow,
    previous: Option<VelocitySample>,
    latest: Option<VelocitySample>,
}

impl TrackedWindow {
    pub fn new(window_ms: u64, capacity: usize) -> Self {
        Self {
            window: SlidingWindow::new(window_ms, capacity),
            previous: None,
            latest: None,
        }
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub(crate) fn window_mut(&mut self) -> &mut SlidingWindow {
        &mut self.window
    }

    /// Sample slot width & minimum acceleration step.
    pub fn step_ms(&self) -> u64 {
        (self.window.window_ms() / SAMPLES_PER_WINDOW).max(1)
    }

    /// Take a sample of the window ending at `now_ms`.
    pub fn sample(&mut self, now_ms: u64) {
        self.window.advance(now_ms);
        let totals = self.window.totals(now_ms);
        let secs = self.window.window_ms() as f64 / 1000.0;
        let sample = VelocitySample {
            time_ms: now_ms,
            totals,
            events_per_sec: totals.count() as f64 / secs,
            notional_per_sec: totals.notional_usd() as f64 / secs,
        };

        let step_ms = self.step_ms();
        match self.latest {
            Some(latest) if latest.time_ms / step_ms != now_ms / step_ms => {
                self.previous = Some(latest);
                self.latest = Some(sample);
            }
            _ => self.latest = Some(sample),
        }
    }

    pub fn latest(&self) -> Option<VelocitySample> {
        self.latest
    }

    pub fn previous(&self) -> Option<VelocitySample> {
        self.previous
    }

    pub fn acceleration(&self) -> Option<Acceleration> {
        let (previous, latest) = (self.previous?, self.latest?);
        Some(Acceleration::between(&previous, &latest, self.step_ms()))
    }
}

/// Copy of one window's current reading.
#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct WindowReading {
    pub window_ms: u64,
    pub sample: VelocitySample,
    pub acceleration: Option<Acceleration>,
}

/// Point in time copy of a symbol's velocity state, handed to the scorer so no borrow of
/// the registry outlives the hot path.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct VelocitySnapshot {
    pub symbol: SymbolId,
    pub clock_ms: u64,
    /// In the same order as the configured [`WindowSpec`]s.
    pub windows: Vec<WindowReading>,
    /// Per-exchange totals over the correlation window.
    pub exchanges: Vec<(ExchangeId, WindowTotals)>,
}

impl VelocitySnapshot {
    /// Reading of the window with length `window_ms`, if tracked.
    pub fn window(&self, window_ms: u64) -> Option<&WindowReading> {
        self.windows
            .iter()
            .find(|reading| reading.window_ms == window_ms)
    }
}

/// Event driven velocity & acceleration over the configured windows, for every resident
/// symbol.
#[derive(Debug)]
pub struct VelocityCalculator {
    specs: Vec<WindowSpec>,
    hot: HotTierSettings,
    correlation_window_ms: u64,
    registry: SymbolRegistry,
}

impl VelocityCalculator {
    pub fn new(
        velocity: &VelocitySettings,
        hot: &HotTierSettings,
        correlation_window_ms: u64,
    ) -> Self {
        Self {
            specs: velocity.windows.clone(),
            hot: hot.clone(),
            correlation_window_ms,
            registry: SymbolRegistry::new(hot.max_symbols),
        }
    }

    /// Record a liquidation & resample its symbol's windows. Returns the symbol evicted to
    /// make room, if any.
    pub fn observe(&mut self, event: &LiquidationEvent) -> Option<SymbolId> {
        let symbol = event.symbol();
        let (specs, hot, correlation_window_ms) =
            (&self.specs, &self.hot, self.correlation_window_ms);

        let evicted = self.registry.ensure(symbol, || {
            SymbolState::new(
                symbol,
                hot.ring_capacity,
                specs
                    .iter()
                    .map(|spec| TrackedWindow::new(spec.window_ms, hot.window_capacity))
                    .collect(),
                correlation_window_ms,
                hot.totals_retention_ms,
                hot.window_capacity,
            )
        });

        if let Some(state) = self.registry.get_mut(symbol) {
            state.record(event);
        }
        evicted
    }

    /// Let a symbol's windows decay up to `now_ms` without a new liquidation.
    pub fn advance(&mut self, symbol: SymbolId, now_ms: u64) -> bool {
        self.registry
            .peek_mut(symbol)
            .is_some_and(|state| state.advance(now_ms))
    }

    /// Advance every resident symbol, without affecting eviction order.
    pub fn advance_all(&mut self, now_ms: u64) {
        let symbols = self.registry.symbols().collect::<Vec<_>>();
        for symbol in symbols {
            if let Some(state) = self.registry.peek_mut(symbol) {
                state.advance(now_ms);
            }
        }
    }

    pub fn snapshot(&self, symbol: SymbolId) -> Option<VelocitySnapshot> {
        let state = self.registry.get(symbol)?;

        let windows = state
            .windows()
            .iter()
            .map(|tracked| WindowReading {
                window_ms: tracked.window().window_ms(),
                sample: tracked.latest().unwrap_or_default(),
                acceleration: tracked.acceleration(),
            })
            .collect();

        Some(VelocitySnapshot {
            symbol,
            clock_ms: state.clock_ms(),
            windows,
            exchanges: state.exchange_totals(),
        })
    }

    pub fn state(&self, symbol: SymbolId) -> Option<&SymbolState> {
        self.registry.get(symbol)
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn specs(&self) -> &[WindowSpec] {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_data::model::{Side, decimal::PackedDecimal};
    use rust_decimal_macros::dec;

    const T0: u64 = 1_700_000_100_000;

    fn event(time_ms: u64) -> LiquidationEvent {
        LiquidationEvent::new(
            ExchangeId::BinanceFuturesUsd,
            SymbolId(0),
            Side::Long,
            PackedDecimal::from_decimal(dec!(50000)).unwrap(),
            PackedDecimal::from_decimal(dec!(4)).unwrap(),
            time_ms,
        )
    }

    fn calculator() -> VelocityCalculator {
        VelocityCalculator::new(&VelocitySettings::default(), &HotTierSettings::default(), 10_000)
    }

    /// Deterministic offsets in `[0, bound)`.
    fn jitter(count: u64, bound: u64, seed: u64) -> Vec<u64> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 33) % bound
            })
            .collect()
    }

    #[test]
    fn test_velocity_equals_count_over_window() {
        struct TestCase {
            window_ms: u64,
            count: u64,
            seed: u64,
        }

        let tests = vec![
            TestCase {
                // TC0: 100ms window
                window_ms: 100,
                count: 7,
                seed: 1,
            },
            TestCase {
                // TC1: 1s window
                window_ms: 1_000,
                count: 20,
                seed: 2,
            },
            TestCase {
                // TC2: 5s window, different jitter
                window_ms: 5_000,
                count: 50,
                seed: 3,
            },
            TestCase {
                // TC3: 5s window, same burst size again
                window_ms: 5_000,
                count: 50,
                seed: 99,
            },
            TestCase {
                // TC4: 5m window
                window_ms: 300_000,
                count: 300,
                seed: 4,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut calculator = calculator();
            let mut offsets = jitter(test.count, test.window_ms, test.seed);
            offsets.sort_unstable();
            for offset in offsets {
                calculator.observe(&event(T0 + offset));
            }

            let snapshot = calculator.snapshot(SymbolId(0)).unwrap();
            let reading = snapshot.window(test.window_ms).unwrap();
            let expected = test.count as f64 / (test.window_ms as f64 / 1000.0);
            assert!(
                (reading.sample.events_per_sec - expected).abs() < 1e-9,
                "TC{} failed: {} != {}",
                index,
                reading.sample.events_per_sec,
                expected
            );
            assert_eq!(
                reading.sample.totals.notional_usd(),
                test.count * 200_000,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_snapshot_keyed_by_configured_length() {
        let settings = VelocitySettings {
            windows: vec![WindowSpec::new(150, 20.0, 1_000_000.0)],
            ..VelocitySettings::default()
        };
        let mut calculator =
            VelocityCalculator::new(&settings, &HotTierSettings::default(), 10_000);
        for offset in [0, 60, 120, 149] {
            calculator.observe(&event(T0 + offset));
        }

        let snapshot = calculator.snapshot(SymbolId(0)).unwrap();
        assert_eq!(snapshot.windows.len(), 1);
        let reading = snapshot.window(150).unwrap();
        assert_eq!(reading.sample.totals.count(), 4);
        assert!(snapshot.window(100).is_none());
    }

    #[test]
    fn test_acceleration_sign() {
        struct TestCase {
            previous: f64,
            latest: f64,
            expected_positive: Option<bool>,
        }

        let tests = vec![
            TestCase {
                // TC0: speeding up
                previous: 1.0,
                latest: 4.0,
                expected_positive: Some(true),
            },
            TestCase {
                // TC1: slowing down
                previous: 4.0,
                latest: 1.0,
                expected_positive: Some(false),
            },
            TestCase {
                // TC2: steady
                previous: 2.0,
                latest: 2.0,
                expected_positive: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let previous = VelocitySample {
                time_ms: T0,
                events_per_sec: test.previous,
                notional_per_sec: test.previous * 1_000.0,
                ..VelocitySample::default()
            };
            let latest = VelocitySample {
                time_ms: T0 + 500,
                events_per_sec: test.latest,
                notional_per_sec: test.latest * 1_000.0,
                ..VelocitySample::default()
            };

            let accel = Acceleration::between(&previous, &latest, 250);
            let actual = match accel.events_per_sec2 {
                value if value > 0.0 => Some(true),
                value if value < 0.0 => Some(false),
                _ => None,
            };
            assert_eq!(actual, test.expected_positive, "TC{} failed", index);
            assert!(
                accel.notional_per_sec2.signum() == accel.events_per_sec2.signum(),
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_acceleration_step_is_floored() {
        let previous = VelocitySample {
            time_ms: T0,
            events_per_sec: 1.0,
            ..VelocitySample::default()
        };
        let latest = VelocitySample {
            time_ms: T0 + 1,
            events_per_sec: 2.0,
            ..VelocitySample::default()
        };
        assert_eq!(Acceleration::between(&previous, &latest, 250).events_per_sec2, 4.0);
    }

    #[test]
    fn test_tracked_window_keeps_two_samples() {
        let mut tracked = TrackedWindow::new(1_000, 1_024);
        assert_eq!(tracked.step_ms(), 250);

        tracked.window_mut().record(T0, T0, Side::Long, 10);
        tracked.sample(T0);
        assert!(tracked.acceleration().is_none());

        // same sample slot replaces the latest sample
        tracked.window_mut().record(T0 + 100, T0 + 100, Side::Long, 10);
        tracked.sample(T0 + 100);
        assert!(tracked.previous().is_none());
        assert_eq!(tracked.latest().map(|sample| sample.totals.count()), Some(2));

        // next slot shifts it into previous
        tracked.window_mut().record(T0 + 300, T0 + 300, Side::Long, 10);
        tracked.window_mut().record(T0 + 310, T0 + 310, Side::Long, 10);
        tracked.sample(T0 + 310);
        assert_eq!(tracked.previous().map(|sample| sample.totals.count()), Some(2));
        assert_eq!(tracked.latest().map(|sample| sample.totals.count()), Some(4));

        let accel = tracked.acceleration().unwrap();
        assert!(accel.events_per_sec2 > 0.0);
    }

    #[test]
    fn test_burst_saturates_acceleration_somewhere() {
        let mut calculator = calculator();
        for step in 0..50 {
            calculator.observe(&event(T0 + step * 100));
        }

        let snapshot = calculator.snapshot(SymbolId(0)).unwrap();
        let specs = calculator.specs();
        let saturated = snapshot.windows.iter().zip(specs).any(|(reading, spec)| {
            reading
                .acceleration
                .is_some_and(|accel| accel.events_per_sec2 >= spec.count_accel_saturation())
        });
        assert!(saturated);
    }

    #[test]
    fn test_advance_decays_velocity() {
        let mut calculator = calculator();
        calculator.observe(&event(T0));
        assert!(calculator.advance(SymbolId(0), T0 + 2_000));
        assert!(!calculator.advance(SymbolId(0), T0 + 1_000));

        let snapshot = calculator.snapshot(SymbolId(0)).unwrap();
        assert_eq!(snapshot.window(1_000).unwrap().sample.events_per_sec, 0.0);
        assert_eq!(snapshot.window(5_000).unwrap().sample.events_per_sec, 0.2);
    }
}
