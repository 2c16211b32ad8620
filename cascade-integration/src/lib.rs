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

//! # Cascade-Integration
//! Low-level plumbing shared by every exchange adapter in the liquidation cascade workspace.
//!
//! * [`SocketError`](error::SocketError) - one error type for every transport failure.
//! * [`de`] - serde helpers for the string-encoded numbers & epoch timestamps exchanges favour.
//! * [`protocol::websocket`] - WebSocket type aliases and a connect helper.
//! * [`backoff`] - exponential reconnect backoff with full jitter.

/// All [`Error`](std::error::Error)s generated by transport plumbing.
pub mod error;

/// Utilities to assist deserialisation of exchange payloads.
pub mod de;

/// Transport protocols used to talk to exchanges.
pub mod protocol;

/// Exponential reconnect backoff with full jitter.
pub mod backoff;
