use crate::{
    state::{
        ring::RingBuffer,
        window::{SlidingWindow, WindowTotals},
    },
    velocity::TrackedWindow,
};
use cascade_data::model::{ExchangeId, event::LiquidationEvent, symbol::SymbolId};
use fnv::FnvBuildHasher;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed capacity overwrite-oldest ring buffer backing the hot tier.
pub mod ring;

/// Exact sliding window totals.
pub mod window;

/// Hot tier sizing.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HotTierSettings {
    /// Liquidations held per symbol before the oldest is overwritten.
    pub ring_capacity: usize,
    /// Resident symbol cap, beyond which the least recently active symbol is evicted.
    pub max_symbols: usize,
    /// Period after which a symbol's cumulative totals restart.
    pub totals_retention_ms: u64,
    /// Liquidations held by one velocity window before the oldest is evicted early.
    pub window_capacity: usize,
}

impl Default for HotTierSettings {
    fn default() -> Self {
        Self {
            ring_capacity: 2048,
            max_symbols: 256,
            totals_retention_ms: 3_600_000,
            window_capacity: 65_536,
        }
    }
}

/// Running totals since the start of the current retention period.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct CumulativeTotals {
    pub since_ms: u64,
    pub count: u64,
    pub notional_usd: u64,
}

/// Mutable per-symbol state: the hot tier ring buffer, velocity windows with their last two
/// samples, per-exchange activity & cumulative totals.
#[derive(Debug, Clone)]
pub struct SymbolState {
    symbol: SymbolId,
    /// Latest time observed for this symbol. Never moves backwards.
    clock_ms: u64,
    events: RingBuffer<LiquidationEvent>,
    windows: Vec<TrackedWindow>,
    /// Short window of activity per exchange, indexed by [`ExchangeId::as_u8`].
    exchanges: Vec<SlidingWindow>,
    totals: CumulativeTotals,
    totals_retention_ms: u64,
    last_touch: u64,
}

impl SymbolState {
    pub fn new(
        symbol: SymbolId,
        ring_capacity: usize,
        windows: Vec<TrackedWindow>,
        correlation_window_ms: u64,
        totals_retention_ms: u64,
        window_capacity: usize,
    ) -> Self {
        Self {
            symbol,
            clock_ms: 0,
            events: RingBuffer::new(ring_capacity),
            windows,
            exchanges: ExchangeId::ALL
                .iter()
                .map(|_| SlidingWindow::new(correlation_window_ms, window_capacity))
                .collect(),
            totals: CumulativeTotals::default(),
            totals_retention_ms,
            last_touch: 0,
        }
    }

    /// Apply a new liquidation: push it into the ring, count it in every window & take a
    /// fresh velocity sample.
    pub fn record(&mut self, event: &LiquidationEvent) {
        let time_ms = event.time_ms();
        self.clock_ms = self.clock_ms.max(time_ms);

        self.events.push(*event);

        let notional = u64::from(event.notional_usd());
        for tracked in self.windows.iter_mut() {
            tracked
                .window_mut()
                .record(time_ms, self.clock_ms, event.side(), notional);
        }
        if let Some(window) = self.exchanges.get_mut(usize::from(event.exchange().as_u8())) {
            window.record(time_ms, self.clock_ms, event.side(), notional);
        }

        if self.totals.count == 0
            || self.clock_ms.saturating_sub(self.totals.since_ms) >= self.totals_retention_ms
        {
            self.totals = CumulativeTotals {
                since_ms: time_ms,
                ..CumulativeTotals::default()
            };
        }
        self.totals.count += 1;
        self.totals.notional_usd = self.totals.notional_usd.saturating_add(notional);

        self.sample();
    }

    /// Advance the clock without a new liquidation, letting windows decay. Returns false if
    /// `now_ms` is not ahead of the symbol clock.
    pub fn advance(&mut self, now_ms: u64) -> bool {
        if now_ms <= self.clock_ms {
            return false;
        }
        self.clock_ms = now_ms;
        for window in self.exchanges.iter_mut() {
            window.advance(now_ms);
        }
        self.sample();
        true
    }

    fn sample(&mut self) {
        let clock_ms = self.clock_ms;
        for tracked in self.windows.iter_mut() {
            tracked.sample(clock_ms);
        }
    }

    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Hot tier contents, oldest first.
    pub fn events(&self) -> &RingBuffer<LiquidationEvent> {
        &self.events
    }

    pub fn windows(&self) -> &[TrackedWindow] {
        &self.windows
    }

    /// Per-exchange totals over the correlation window, in [`ExchangeId::ALL`] order.
    pub fn exchange_totals(&self) -> Vec<(ExchangeId, WindowTotals)> {
        ExchangeId::ALL
            .iter()
            .zip(self.exchanges.iter())
            .map(|(exchange, window)| (*exchange, window.totals(self.clock_ms)))
            .collect()
    }

    pub fn totals(&self) -> CumulativeTotals {
        self.totals
    }
}

/// Owner of every resident [`SymbolState`], bounded by a least-recently-active eviction
/// policy.
#[derive(Debug)]
pub struct SymbolRegistry {
    states: IndexMap<SymbolId, SymbolState, FnvBuildHasher>,
    max_symbols: usize,
    tick: u64,
    evictions: u64,
}

impl SymbolRegistry {
    pub fn new(max_symbols: usize) -> Self {
        Self {
            states: IndexMap::default(),
            max_symbols: max_symbols.max(1),
            tick: 0,
            evictions: 0,
        }
    }

    /// Insert state for `symbol` if absent, evicting the least recently active symbol when
    /// the registry is full. Returns the evicted symbol, if any.
    pub fn ensure<F>(&mut self, symbol: SymbolId, init: F) -> Option<SymbolId>
    where
        F: FnOnce() -> SymbolState,
    {
        if self.states.contains_key(&symbol) {
            return None;
        }

        let evicted = if self.states.len() >= self.max_symbols {
            self.evict_least_recent()
        } else {
            None
        };

        let mut state = init();
        self.tick += 1;
        state.last_touch = self.tick;
        self.states.insert(symbol, state);
        evicted
    }

    fn evict_least_recent(&mut self) -> Option<SymbolId> {
        let (index, _) = self
            .states
            .values()
            .enumerate()
            .min_by_key(|(_, state)| state.last_touch)?;

        let (symbol, _) = self.states.swap_remove_index(index)?;
        self.evictions += 1;
        debug!(%symbol, evictions = self.evictions, "evicted least recently active symbol state");
        Some(symbol)
    }

    /// Mutable access, marking the symbol as most recently active.
    pub fn get_mut(&mut self, symbol: SymbolId) -> Option<&mut SymbolState> {
        self.tick += 1;
        let tick = self.tick;
        self.states.get_mut(&symbol).map(|state| {
            state.last_touch = tick;
            state
        })
    }

    /// Mutable access, without affecting eviction order.
    pub fn peek_mut(&mut self, symbol: SymbolId) -> Option<&mut SymbolState> {
        self.states.get_mut(&symbol)
    }

    /// Read access, without affecting eviction order.
    pub fn get(&self, symbol: SymbolId) -> Option<&SymbolState> {
        self.states.get(&symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.states.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_data::model::{Side, decimal::PackedDecimal};
    use rust_decimal_macros::dec;

    fn event(exchange: ExchangeId, symbol: u16, side: Side, time_ms: u64) -> LiquidationEvent {
        LiquidationEvent::new(
            exchange,
            SymbolId(symbol),
            side,
            PackedDecimal::from_decimal(dec!(100)).unwrap(),
            PackedDecimal::from_decimal(dec!(2)).unwrap(),
            time_ms,
        )
    }

    fn state(symbol: u16, ring_capacity: usize) -> SymbolState {
        SymbolState::new(
            SymbolId(symbol),
            ring_capacity,
            vec![TrackedWindow::new(1_000, 1_024)],
            10_000,
            60_000,
            1_024,
        )
    }

    #[test]
    fn test_symbol_state_ring_capacity_holds() {
        let mut state = state(0, 8);
        for offset in 0..100 {
            state.record(&event(ExchangeId::Okx, 0, Side::Long, 1_000 + offset));
            assert!(state.events().len() <= 8);
        }
        assert_eq!(state.events().len(), 8);
        assert_eq!(state.events().iter().next().map(|event| event.time_ms()), Some(1_092));
        assert_eq!(state.totals().count, 100);
        assert_eq!(state.totals().notional_usd, 20_000);
    }

    #[test]
    fn test_symbol_state_clock_is_monotonic() {
        let mut state = state(0, 8);
        state.record(&event(ExchangeId::Okx, 0, Side::Long, 5_000));
        state.record(&event(ExchangeId::Okx, 0, Side::Long, 4_000));
        assert_eq!(state.clock_ms(), 5_000);
        assert!(!state.advance(4_500));
        assert!(state.advance(6_000));
        assert_eq!(state.clock_ms(), 6_000);
    }

    #[test]
    fn test_symbol_state_cumulative_totals_reset() {
        struct TestCase {
            times: Vec<u64>,
            expected: CumulativeTotals,
        }

        let tests = vec![
            TestCase {
                // TC0: single retention period
                times: vec![0, 30_000, 59_999],
                expected: CumulativeTotals {
                    since_ms: 0,
                    count: 3,
                    notional_usd: 600,
                },
            },
            TestCase {
                // TC1: retention elapsed, counters restart
                times: vec![0, 30_000, 60_000],
                expected: CumulativeTotals {
                    since_ms: 60_000,
                    count: 1,
                    notional_usd: 200,
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut state = state(0, 8);
            for time in test.times {
                state.record(&event(ExchangeId::Okx, 0, Side::Short, time));
            }
            assert_eq!(state.totals(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_symbol_state_exchange_totals() {
        let mut state = state(0, 8);
        state.record(&event(ExchangeId::Okx, 0, Side::Long, 1_000));
        state.record(&event(ExchangeId::Okx, 0, Side::Short, 1_100));
        state.record(&event(ExchangeId::Bitmex, 0, Side::Long, 1_200));

        let totals = state.exchange_totals();
        let count = |exchange| {
            totals
                .iter()
                .find(|(id, _)| *id == exchange)
                .map(|(_, totals)| totals.count())
        };
        assert_eq!(count(ExchangeId::Okx), Some(2));
        assert_eq!(count(ExchangeId::Bitmex), Some(1));
        assert_eq!(count(ExchangeId::BinanceFuturesUsd), Some(0));
    }

    #[test]
    fn test_symbol_registry_evicts_least_recently_active() {
        let mut registry = SymbolRegistry::new(2);

        assert_eq!(registry.ensure(SymbolId(0), || state(0, 4)), None);
        assert_eq!(registry.ensure(SymbolId(1), || state(1, 4)), None);

        // 0 is touched after 1, so 1 is least recently active
        registry.get_mut(SymbolId(1));
        registry.get_mut(SymbolId(0));

        assert_eq!(registry.ensure(SymbolId(0), || state(0, 4)), None);
        assert_eq!(registry.ensure(SymbolId(2), || state(2, 4)), Some(SymbolId(1)));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(SymbolId(1)).is_none());
        assert!(registry.get(SymbolId(0)).is_some());
        assert_eq!(registry.evictions(), 1);
    }
}
