use crate::state::window::WindowTotals;
use cascade_data::model::{Side, event::LiquidationEvent, symbol::SymbolId};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WarmTierSettings {
    /// Width of one aggregate bucket.
    pub bucket_ms: u64,
    /// Buckets older than this, relative to the newest bucket of the symbol, are dropped.
    pub horizon_ms: u64,
}

impl Default for WarmTierSettings {
    fn default() -> Self {
        Self {
            bucket_ms: 60_000,
            horizon_ms: 4 * 3_600_000,
        }
    }
}

/// Aggregated liquidations for one symbol & time bucket.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize)]
pub struct WarmBucket {
    pub start_ms: u64,
    pub totals: WindowTotals,
}

/// Short horizon per-symbol time bucket aggregates, answering "liquidations in the last N
/// minutes" without replaying individual events.
#[derive(Debug, Default)]
pub struct WarmStore {
    bucket_ms: u64,
    horizon_ms: u64,
    buckets: FnvHashMap<SymbolId, VecDeque<WarmBucket>>,
}

impl WarmStore {
    pub fn new(settings: &WarmTierSettings) -> Self {
        Self {
            bucket_ms: settings.bucket_ms.max(1),
            horizon_ms: settings.horizon_ms,
            buckets: FnvHashMap::default(),
        }
    }

    /// Count a liquidation into its bucket. Only counters are incremented, except when the
    /// liquidation opens a new bucket.
    pub fn record(&mut self, event: &LiquidationEvent) {
        let start_ms = event.time_ms() - event.time_ms() % self.bucket_ms;
        let notional = u64::from(event.notional_usd());
        let side = event.side();
        let horizon_ms = self.horizon_ms;

        let deque = self.buckets.entry(event.symbol()).or_default();
        match deque.back().map(|bucket| bucket.start_ms) {
            Some(newest) if newest == start_ms => {
                if let Some(back) = deque.back_mut() {
                    back.totals.add(side, notional);
                }
            }
            Some(newest) if newest > start_ms => {
                // late liquidation for an older bucket
                if newest - start_ms >= horizon_ms {
                    return;
                }
                match deque.binary_search_by_key(&start_ms, |bucket| bucket.start_ms) {
                    Ok(index) => deque[index].totals.add(side, notional),
                    Err(index) => deque.insert(index, new_bucket(start_ms, side, notional)),
                }
            }
            _ => deque.push_back(new_bucket(start_ms, side, notional)),
        }

        Self::prune(deque, horizon_ms);
    }

    fn prune(deque: &mut VecDeque<WarmBucket>, horizon_ms: u64) {
        let Some(newest) = deque.back().map(|bucket| bucket.start_ms) else {
            return;
        };

        while let Some(front) = deque.front() {
            if newest - front.start_ms >= horizon_ms {
                deque.pop_front();
            } else {
                break;
            }
        }
    }

    /// Totals of every bucket overlapping `[since_ms, ..)`. The bucket containing `since_ms`
    /// is included whole.
    pub fn liquidations_since(&self, symbol: SymbolId, since_ms: u64) -> WindowTotals {
        let mut totals = WindowTotals::default();
        if let Some(deque) = self.buckets.get(&symbol) {
            for bucket in deque
                .iter()
                .rev()
                .take_while(|bucket| bucket.start_ms + self.bucket_ms > since_ms)
            {
                totals.merge(&bucket.totals);
            }
        }
        totals
    }

    /// Get the buckets held for a symbol, oldest first
    pub fn buckets(&self, symbol: SymbolId) -> impl Iterator<Item = &WarmBucket> + '_ {
        self.buckets.get(&symbol).into_iter().flatten()
    }

    pub fn forget(&mut self, symbol: SymbolId) {
        self.buckets.remove(&symbol);
    }

    /// Get number of symbols with aggregates
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn new_bucket(start_ms: u64, side: Side, notional_usd: u64) -> WarmBucket {
    let mut totals = WindowTotals::default();
    totals.add(side, notional_usd);
    WarmBucket { start_ms, totals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_data::model::{ExchangeId, decimal::PackedDecimal};
    use rust_decimal_macros::dec;

    const MINUTE: u64 = 60_000;
    const T0: u64 = 1_700_000_040_000;

    fn event(symbol: u16, side: Side, time_ms: u64) -> LiquidationEvent {
        LiquidationEvent::new(
            ExchangeId::Bitmex,
            SymbolId(symbol),
            side,
            PackedDecimal::from_decimal(dec!(10)).unwrap(),
            PackedDecimal::from_decimal(dec!(100)).unwrap(),
            time_ms,
        )
    }

    fn store() -> WarmStore {
        WarmStore::new(&WarmTierSettings {
            bucket_ms: MINUTE,
            horizon_ms: 60 * MINUTE,
        })
    }

    #[test]
    fn test_warm_store_liquidations_since() {
        struct TestCase {
            events: Vec<(Side, u64)>,
            since_ms: u64,
            expected: WindowTotals,
        }

        let tests = vec![
            TestCase {
                // TC0: nothing recorded
                events: vec![],
                since_ms: T0,
                expected: WindowTotals::default(),
            },
            TestCase {
                // TC1: last 15 minutes excludes the older bucket
                events: vec![
                    (Side::Long, T0),
                    (Side::Long, T0 + 20 * MINUTE),
                    (Side::Short, T0 + 25 * MINUTE + 1),
                    (Side::Short, T0 + 30 * MINUTE),
                ],
                since_ms: T0 + 15 * MINUTE,
                expected: WindowTotals {
                    long_count: 1,
                    short_count: 2,
                    long_notional_usd: 1_000,
                    short_notional_usd: 2_000,
                },
            },
            TestCase {
                // TC2: late liquidation lands in its own bucket
                events: vec![
                    (Side::Long, T0 + 10 * MINUTE),
                    (Side::Short, T0 + 2 * MINUTE),
                ],
                since_ms: T0,
                expected: WindowTotals {
                    long_count: 1,
                    short_count: 1,
                    long_notional_usd: 1_000,
                    short_notional_usd: 1_000,
                },
            },
            TestCase {
                // TC3: bucket containing `since` is included whole
                events: vec![(Side::Long, T0 + 1)],
                since_ms: T0 + MINUTE - 1,
                expected: WindowTotals {
                    long_count: 1,
                    short_count: 0,
                    long_notional_usd: 1_000,
                    short_notional_usd: 0,
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut store = store();
            for (side, time) in test.events {
                store.record(&event(0, side, time));
            }
            assert_eq!(
                store.liquidations_since(SymbolId(0), test.since_ms),
                test.expected,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_warm_store_horizon() {
        let mut store = store();
        store.record(&event(0, Side::Long, T0));
        store.record(&event(0, Side::Long, T0 + 30 * MINUTE));
        store.record(&event(0, Side::Long, T0 + 61 * MINUTE));

        let starts = store
            .buckets(SymbolId(0))
            .map(|bucket| bucket.start_ms)
            .collect::<Vec<_>>();
        assert_eq!(starts, vec![T0 + 30 * MINUTE, T0 + 61 * MINUTE]);

        // too old relative to the newest bucket
        store.record(&event(0, Side::Long, T0));
        assert_eq!(store.buckets(SymbolId(0)).count(), 2);
        assert_eq!(store.liquidations_since(SymbolId(0), 0).count(), 2);
    }

    #[test]
    fn test_warm_store_symbols_are_independent() {
        let mut store = store();
        store.record(&event(0, Side::Long, T0));
        store.record(&event(1, Side::Short, T0));
        store.forget(SymbolId(0));

        assert_eq!(store.len(), 1);
        assert!(store.liquidations_since(SymbolId(0), 0).is_empty());
        assert_eq!(store.liquidations_since(SymbolId(1), 0).short_count, 1);
    }
}
