use crate::{scorer::CascadeSignal, state::window::WindowTotals};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Liquidation activity behind an [`Alert`], over the signal's trigger window.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct WindowSummary {
    pub window_ms: u64,
    pub count: u64,
    pub notional_usd: u64,
    pub long_count: u64,
    pub short_count: u64,
    pub long_notional_usd: u64,
    pub short_notional_usd: u64,
}

impl WindowSummary {
    pub fn from_totals(window_ms: u64, totals: &WindowTotals) -> Self {
        Self {
            window_ms,
            count: totals.count(),
            notional_usd: totals.notional_usd(),
            long_count: totals.long_count,
            short_count: totals.short_count,
            long_notional_usd: totals.long_notional_usd,
            short_notional_usd: totals.short_notional_usd,
        }
    }
}

/// A [`CascadeSignal`] the dispatcher decided to deliver.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Alert {
    pub signal: CascadeSignal,
    pub summary: WindowSummary,
    pub time: DateTime<Utc>,
}

/// Destination for delivered [`Alert`]s.
///
/// Called from the engine's hot path, so implementations must not block.
pub trait AlertSink: std::fmt::Debug + Send {
    fn deliver(&mut self, alert: &Alert);
}

/// Logs every [`Alert`] at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn deliver(&mut self, alert: &Alert) {
        info!(
            symbol = %alert.signal.symbol_name,
            severity = %alert.signal.severity,
            score = alert.signal.score,
            velocity = alert.signal.sub_scores.velocity,
            acceleration = alert.signal.sub_scores.acceleration,
            correlation = alert.signal.sub_scores.correlation,
            market = ?alert.signal.sub_scores.market,
            window_ms = alert.summary.window_ms,
            count = alert.summary.count,
            notional_usd = alert.summary.notional_usd,
            "liquidation cascade alert"
        );
    }
}

/// Forwards [`Alert`]s to a bounded channel, dropping them when the consumer falls behind.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<Alert>,
    dropped: u64,
}

impl ChannelAlertSink {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl AlertSink for ChannelAlertSink {
    fn deliver(&mut self, alert: &Alert) {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!(
                    symbol = %alert.signal.symbol_name,
                    dropped = self.dropped,
                    "alert channel full, dropping alert"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
            }
        }
    }
}

/// Publishes [`Alert`]s to every subscriber of a broadcast channel. Having no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct BroadcastAlertSink {
    tx: broadcast::Sender<Alert>,
}

impl BroadcastAlertSink {
    pub fn new(tx: broadcast::Sender<Alert>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

impl AlertSink for BroadcastAlertSink {
    fn deliver(&mut self, alert: &Alert) {
        let _ = self.tx.send(alert.clone());
    }
}

impl<A, B> AlertSink for (A, B)
where
    A: AlertSink,
    B: AlertSink,
{
    fn deliver(&mut self, alert: &Alert) {
        self.0.deliver(alert);
        self.1.deliver(alert);
    }
}
