use crate::model::{
    ExchangeId, Side, decimal::PackedDecimal, event::Ingested, symbol::SymbolId,
};
use fnv::FnvHashMap;
use std::collections::{VecDeque, hash_map::Entry};

/// Identity of an ingested liquidation for duplicate suppression.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DedupKey {
    /// Venue assigned sequence / trade id.
    Sequence { exchange: ExchangeId, seq: u64 },
    /// Content fingerprint with the exchange timestamp truncated to a bucket, for venues
    /// without ids.
    Fingerprint {
        exchange: ExchangeId,
        symbol: SymbolId,
        side: Side,
        price: PackedDecimal,
        quantity: PackedDecimal,
        bucket: u64,
    },
}

impl DedupKey {
    pub fn new(ingested: &Ingested, bucket_ms: u64) -> Self {
        let event = &ingested.event;
        match ingested.source_seq {
            Some(seq) => DedupKey::Sequence {
                exchange: event.exchange(),
                seq,
            },
            None => DedupKey::Fingerprint {
                exchange: event.exchange(),
                symbol: event.symbol(),
                side: event.side(),
                price: event.price(),
                quantity: event.quantity(),
                bucket: event.time_ms() / bucket_ms.max(1),
            },
        }
    }
}

/// Bounded seen-set of [`DedupKey`]s, expiring entries older than the window.
#[derive(Debug)]
pub struct Deduplicator {
    window_ms: u64,
    bucket_ms: u64,
    seen: FnvHashMap<DedupKey, u64>,
    expiry: VecDeque<(u64, DedupKey)>,
}

impl Deduplicator {
    pub fn new(window_ms: u64, bucket_ms: u64) -> Self {
        Self {
            window_ms,
            bucket_ms,
            seen: FnvHashMap::default(),
            expiry: VecDeque::new(),
        }
    }

    /// Record the [`Ingested`] event, returning `true` if it has not been seen within the
    /// window. Time is taken from the local receive timestamp.
    pub fn is_unique(&mut self, ingested: &Ingested) -> bool {
        let now_ms = ingested.received_ms;
        self.evict(now_ms);

        match self.seen.entry(DedupKey::new(ingested, self.bucket_ms)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                self.expiry.push_back((now_ms, *entry.key()));
                entry.insert(now_ms);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while let Some((inserted, key)) = self.expiry.front().copied() {
            if inserted >= cutoff {
                break;
            }
            self.expiry.pop_front();
            self.seen.remove(&key);
        }
    }
}
