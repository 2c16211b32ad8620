use cascade_data::model::Side;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Liquidation totals split by liquidated side.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct WindowTotals {
    pub long_count: u64,
    pub short_count: u64,
    pub long_notional_usd: u64,
    pub short_notional_usd: u64,
}

impl WindowTotals {
    pub fn add(&mut self, side: Side, notional_usd: u64) {
        match side {
            Side::Long => {
                self.long_count += 1;
                self.long_notional_usd = self.long_notional_usd.saturating_add(notional_usd);
            }
            Side::Short => {
                self.short_count += 1;
                self.short_notional_usd = self.short_notional_usd.saturating_add(notional_usd);
            }
        }
    }

    pub fn remove(&mut self, side: Side, notional_usd: u64) {
        match side {
            Side::Long => {
                self.long_count = self.long_count.saturating_sub(1);
                self.long_notional_usd = self.long_notional_usd.saturating_sub(notional_usd);
            }
            Side::Short => {
                self.short_count = self.short_count.saturating_sub(1);
                self.short_notional_usd = self.short_notional_usd.saturating_sub(notional_usd);
            }
        }
    }

    pub fn merge(&mut self, other: &WindowTotals) {
        self.long_count += other.long_count;
        self.short_count += other.short_count;
        self.long_notional_usd = self.long_notional_usd.saturating_add(other.long_notional_usd);
        self.short_notional_usd = self
            .short_notional_usd
            .saturating_add(other.short_notional_usd);
    }

    /// Get total number of liquidations
    pub fn count(&self) -> u64 {
        self.long_count + self.short_count
    }

    /// Get total liquidated notional
    pub fn notional_usd(&self) -> u64 {
        self.long_notional_usd.saturating_add(self.short_notional_usd)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[derive(Copy, Clone, Debug)]
struct Entry {
    time_ms: u64,
    notional_usd: u64,
    side: Side,
}

/// Sliding window of liquidation totals over `(now - window, now]`.
///
/// Entries are kept in time order & evicted one by one as they fall out of the window, with
/// running totals maintained alongside, so reading is O(1) and a burst of K liquidations
/// inside the window always counts K wherever it starts. Late arrivals are inserted in order.
/// Past `capacity` entries the oldest is evicted early & counted as truncated.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window_ms: u64,
    capacity: usize,
    entries: VecDeque<Entry>,
    totals: WindowTotals,
    truncated: u64,
}

impl SlidingWindow {
    pub fn new(window_ms: u64, capacity: usize) -> Self {
        Self {
            window_ms: window_ms.max(1),
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            totals: WindowTotals::default(),
            truncated: 0,
        }
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Number of liquidations currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Liquidations evicted early because the window was at capacity.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }

    fn expired(&self, time_ms: u64, now_ms: u64) -> bool {
        time_ms.saturating_add(self.window_ms) <= now_ms
    }

    /// Record a liquidation at `time_ms` given the current clock `now_ms`.
    ///
    /// Returns false if the liquidation is already older than the window & was ignored.
    pub fn record(&mut self, time_ms: u64, now_ms: u64, side: Side, notional_usd: u64) -> bool {
        let now_ms = now_ms.max(time_ms);
        if self.expired(time_ms, now_ms) {
            return false;
        }
        self.advance(now_ms);

        let entry = Entry {
            time_ms,
            notional_usd,
            side,
        };
        match self.entries.back() {
            Some(last) if last.time_ms > time_ms => {
                let index = self.entries.partition_point(|entry| entry.time_ms <= time_ms);
                self.entries.insert(index, entry);
            }
            _ => self.entries.push_back(entry),
        }
        self.totals.add(side, notional_usd);

        if self.entries.len() > self.capacity {
            self.pop_oldest();
            self.truncated += 1;
        }
        true
    }

    /// Evict every liquidation that has left the window ending at `now_ms`.
    pub fn advance(&mut self, now_ms: u64) {
        while self
            .entries
            .front()
            .is_some_and(|entry| self.expired(entry.time_ms, now_ms))
        {
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some(entry) = self.entries.pop_front() {
            self.totals.remove(entry.side, entry.notional_usd);
        }
    }

    /// Totals of the window ending at `now_ms`, without evicting.
    pub fn totals(&self, now_ms: u64) -> WindowTotals {
        let mut totals = self.totals;
        for entry in self
            .entries
            .iter()
            .take_while(|entry| self.expired(entry.time_ms, now_ms))
        {
            totals.remove(entry.side, entry.notional_usd);
        }
        totals
    }
}
