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

//! # Cascade-Engine
//! Liquidation cascade detection over the normalised streams produced by `cascade-data`.
//!
//! Liquidations flow through a single [`CascadeEngine`] task:
//! 1. The [`VelocityCalculator`] updates the symbol's hot tier ring buffer & sliding windows
//!    (100ms to 5m) and samples velocity & acceleration.
//! 2. The [`TieredStore`] counts it into warm tier time buckets & queues it for the cold tier
//!    [`ArchiveWorker`], without awaiting any IO.
//! 3. The [`CascadeScorer`] combines velocity, acceleration, cross-exchange correlation &
//!    open interest / funding context into a score in [0, 1] & a [`Severity`].
//! 4. The [`SignalDispatcher`] applies the per-symbol cooldown & escalation rules before
//!    handing [`Alert`]s to an [`AlertSink`].
//!
//! [`CascadeEngine`]: engine::CascadeEngine
//! [`VelocityCalculator`]: velocity::VelocityCalculator
//! [`TieredStore`]: store::TieredStore
//! [`ArchiveWorker`]: store::archive::ArchiveWorker
//! [`CascadeScorer`]: scorer::CascadeScorer
//! [`Severity`]: scorer::Severity
//! [`SignalDispatcher`]: dispatcher::SignalDispatcher
//! [`Alert`]: sink::Alert
//! [`AlertSink`]: sink::AlertSink

#[cfg(test)]
use rust_decimal as _;

/// Layered JSON file & environment configuration.
pub mod config;

/// All [`Error`](std::error::Error)s generated in `cascade-engine`.
pub mod error;

/// Per-symbol hot tier state & its registry.
pub mod state;

/// Multi-window velocity & acceleration.
pub mod velocity;

/// Warm & cold storage tiers.
pub mod store;

/// Open interest & funding context derived from market readings.
pub mod context;

/// Composite cascade scoring.
pub mod scorer;

/// Alert cooldown & escalation.
pub mod dispatcher;

/// Alert delivery targets.
pub mod sink;

/// The engine task tying every stage together.
pub mod engine;

/// Pipeline wide health reporting.
pub mod health;
