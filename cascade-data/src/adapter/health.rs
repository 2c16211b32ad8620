use crate::model::ExchangeId;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use tracing::warn;

/// Default sampling period for malformed message warnings.
pub const DEFAULT_MALFORMED_WARN_EVERY: u64 = 100;

/// Lock-free health counters shared between an adapter task & observers.
#[derive(Debug)]
pub struct AdapterHealth {
    exchange: ExchangeId,
    connected: AtomicBool,
    connected_since_ms: AtomicU64,
    reconnects: AtomicU64,
    messages: AtomicU64,
    session_messages: AtomicU64,
    malformed: AtomicU64,
    events: AtomicU64,
    malformed_warn_every: u64,
}

/// Point in time view of an [`AdapterHealth`].
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct HealthSnapshot {
    pub exchange: ExchangeId,
    pub connected: bool,
    pub connected_since_ms: Option<u64>,
    pub reconnects: u64,
    pub messages: u64,
    pub malformed: u64,
    pub events: u64,
    /// Messages per second over the current connection.
    pub message_rate: f64,
}

impl AdapterHealth {
    pub fn new(exchange: ExchangeId, malformed_warn_every: u64) -> Self {
        Self {
            exchange,
            connected: AtomicBool::new(false),
            connected_since_ms: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            session_messages: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            events: AtomicU64::new(0),
            malformed_warn_every: malformed_warn_every.max(1),
        }
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Mark the adapter connected. The connected-since timestamp never moves backwards, even
    /// if the wall clock does.
    pub fn set_connected(&self, now_ms: u64) {
        self.connected_since_ms.fetch_max(now_ms, Ordering::Relaxed);
        self.session_messages.store(0, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    pub fn set_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.session_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped malformed message, logging the first & then every Nth occurrence.
    pub fn record_malformed(&self, error: &impl Display) {
        let count = self.malformed.fetch_add(1, Ordering::Relaxed) + 1;
        if count == 1 || count % self.malformed_warn_every == 0 {
            warn!(
                exchange = %self.exchange,
                malformed_total = count,
                %error,
                "dropped malformed message"
            );
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> HealthSnapshot {
        let connected = self.is_connected();
        let since = self.connected_since_ms.load(Ordering::Relaxed);
        let session_messages = self.session_messages.load(Ordering::Relaxed);

        let message_rate = if connected && now_ms > since {
            session_messages as f64 / ((now_ms - since) as f64 / 1000.0)
        } else {
            0.0
        };

        HealthSnapshot {
            exchange: self.exchange,
            connected,
            connected_since_ms: connected.then_some(since),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            message_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_health_snapshot() {
        let health = AdapterHealth::new(ExchangeId::Okx, 10);

        let snapshot = health.snapshot(1_000);
        assert!(!snapshot.connected);
        assert_eq!(snapshot.connected_since_ms, None);

        health.set_connected(10_000);
        for _ in 0..20 {
            health.record_message();
        }
        health.record_malformed(&"bad json");

        let snapshot = health.snapshot(20_000);
        assert!(snapshot.connected);
        assert_eq!(snapshot.connected_since_ms, Some(10_000));
        assert_eq!(snapshot.messages, 20);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.message_rate, 2.0);
    }

    #[test]
    fn test_connected_since_is_monotonic() {
        let health = AdapterHealth::new(ExchangeId::Okx, 10);

        health.set_connected(50_000);
        health.set_disconnected();
        health.record_reconnect();

        // Wall clock stepped backwards between sessions
        health.set_connected(40_000);

        let snapshot = health.snapshot(60_000);
        assert_eq!(snapshot.connected_since_ms, Some(50_000));
        assert_eq!(snapshot.reconnects, 1);
    }
}
