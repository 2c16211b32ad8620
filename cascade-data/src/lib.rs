#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! # Cascade-Data
//! Normalised liquidation streams from perpetual futures venues.
//!
//! **It is:**
//! * **Normalised**: every venue produces the same compact [`LiquidationEvent`], with the
//!   liquidated position side resolved by a per-venue [`SideDetector`].
//! * **Self-healing**: adapters reconnect with jittered exponential backoff & report
//!   [`AdapterHealth`] instead of surfacing transport errors.
//! * **Deduplicated**: the [`EventRouter`] drops replays by venue sequence id or content
//!   fingerprint before fanning out to any number of subscribers.
//!
//! ## Venues
//! * Binance USD-M futures (`!forceOrder@arr`)
//! * Bybit linear perpetuals (`allLiquidation`)
//! * Okx swaps (`liquidation-orders`)
//! * BitMEX (`liquidation` table)
//! * Hyperliquid (`trades`, filtered to liquidator fills)
//! * dYdX v4 (indexer REST polling)
//!
//! [`LiquidationEvent`]: model::event::LiquidationEvent
//! [`SideDetector`]: exchange::side::SideDetector
//! [`AdapterHealth`]: adapter::health::AdapterHealth
//! [`EventRouter`]: router::EventRouter

#[cfg(test)]
use criterion as _;
#[cfg(test)]
use tokio_test as _;

/// All [`Error`](std::error::Error)s generated in `cascade-data`.
pub mod error;

/// Core data model: [`LiquidationEvent`](model::event::LiquidationEvent), symbols, sides &
/// the binary codec.
pub mod model;

/// Venue [`Connector`](exchange::Connector)s & message types.
pub mod exchange;

/// Reconnecting WebSocket & REST polling adapters.
pub mod adapter;

/// Dedup & broadcast fan-out of adapter streams.
pub mod router;

/// Open interest & funding [`MarketContextProvider`](context::MarketContextProvider)s.
pub mod context;

/// Graceful shutdown signal shared by every task.
pub mod shutdown;

/// Stream utilities.
pub mod streams;

/// Current wall clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
