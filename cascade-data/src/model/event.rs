use super::{
    ExchangeId, Side,
    decimal::{PackedDecimal, notional_usd},
    symbol::SymbolId,
};
use serde::{Deserialize, Serialize};

/// Largest representable event time: 48 bits of milliseconds, beyond the year 10000.
pub const MAX_TIME_MS: u64 = (1 << 48) - 1;

/// Normalised, immutable liquidation record shared by every stage of the pipeline.
///
/// Kept `Copy` and within 20 bytes so it can be cloned into ring buffers, broadcast channels &
/// archive queues without allocation. The time is held as 48 bits split across two fields so
/// no member forces 8 byte alignment, and the USD notional is derived from price & quantity
/// on access.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(from = "EventFields", into = "EventFields")]
pub struct LiquidationEvent {
    price: PackedDecimal,
    quantity: PackedDecimal,
    time_lo: u32,
    time_hi: u16,
    symbol: SymbolId,
    exchange: ExchangeId,
    side: Side,
}

/// Serialised shape of a [`LiquidationEvent`].
#[derive(Copy, Clone, Deserialize, Serialize)]
struct EventFields {
    time_ms: u64,
    exchange: ExchangeId,
    symbol: SymbolId,
    side: Side,
    price: PackedDecimal,
    quantity: PackedDecimal,
}

impl From<EventFields> for LiquidationEvent {
    fn from(fields: EventFields) -> Self {
        Self::new(
            fields.exchange,
            fields.symbol,
            fields.side,
            fields.price,
            fields.quantity,
            fields.time_ms,
        )
    }
}

impl From<LiquidationEvent> for EventFields {
    fn from(event: LiquidationEvent) -> Self {
        Self {
            time_ms: event.time_ms(),
            exchange: event.exchange,
            symbol: event.symbol,
            side: event.side,
            price: event.price,
            quantity: event.quantity,
        }
    }
}

impl LiquidationEvent {
    /// Times beyond [`MAX_TIME_MS`] saturate.
    pub fn new(
        exchange: ExchangeId,
        symbol: SymbolId,
        side: Side,
        price: PackedDecimal,
        quantity: PackedDecimal,
        time_ms: u64,
    ) -> Self {
        let time_ms = time_ms.min(MAX_TIME_MS);
        Self {
            price,
            quantity,
            time_lo: time_ms as u32,
            time_hi: (time_ms >> 32) as u16,
            symbol,
            exchange,
            side,
        }
    }

    /// Exchange timestamp in milliseconds since the Unix epoch.
    pub fn time_ms(&self) -> u64 {
        (u64::from(self.time_hi) << 32) | u64::from(self.time_lo)
    }

    pub fn price(&self) -> PackedDecimal {
        self.price
    }

    /// Quantity in base asset units.
    pub fn quantity(&self) -> PackedDecimal {
        self.quantity
    }

    /// Whole US dollar notional, saturating at `u32::MAX`.
    pub fn notional_usd(&self) -> u32 {
        notional_usd(self.price, self.quantity)
    }

    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

/// [`LiquidationEvent`] as produced by an adapter, before deduplication.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Ingested {
    pub event: LiquidationEvent,
    /// Venue assigned sequence / trade id, when the venue provides one.
    pub source_seq: Option<u64>,
    /// Local receive time in milliseconds since the Unix epoch.
    pub received_ms: u64,
}
