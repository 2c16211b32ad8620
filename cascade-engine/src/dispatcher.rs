use crate::{
    scorer::{CascadeSignal, Severity},
    sink::{Alert, AlertSink, WindowSummary},
};
use cascade_data::model::symbol::SymbolId;
use cascade_integration::backoff::duration_ms;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Minimum time between two alerts of the same or lower severity for one symbol.
    #[serde(with = "duration_ms", rename = "cooldown_ms")]
    pub cooldown: Duration,
    /// Signals below this severity are never delivered.
    pub min_severity: Severity,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(120),
            min_severity: Severity::Low,
        }
    }
}

/// Outcome of offering a [`CascadeSignal`] to the [`SignalDispatcher`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Dispatch {
    /// First alert for the symbol, or the cooldown expired.
    Emitted,
    /// Severity rose above the last delivered alert inside the cooldown.
    Escalated,
    /// Same or lower severity inside the cooldown.
    Suppressed { remaining_ms: u64 },
    BelowThreshold,
}

impl Dispatch {
    pub fn delivered(&self) -> bool {
        matches!(self, Dispatch::Emitted | Dispatch::Escalated)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct DispatchStats {
    pub emitted: u64,
    pub escalated: u64,
    pub suppressed: u64,
}

/// Per-symbol alert cooldown with severity escalation bypass.
#[derive(Debug)]
pub struct SignalDispatcher<Sink> {
    settings: DispatcherSettings,
    sink: Sink,
    /// Time & severity of the last delivered alert per symbol.
    last: FnvHashMap<SymbolId, (u64, Severity)>,
    stats: DispatchStats,
}

impl<Sink> SignalDispatcher<Sink>
where
    Sink: AlertSink,
{
    pub fn new(settings: DispatcherSettings, sink: Sink) -> Self {
        Self {
            settings,
            sink,
            last: FnvHashMap::default(),
            stats: DispatchStats::default(),
        }
    }

    /// Decide what would happen to the signal without delivering it or touching state.
    pub fn decide(&self, signal: &CascadeSignal) -> Dispatch {
        if signal.severity == Severity::None || signal.severity < self.settings.min_severity {
            return Dispatch::BelowThreshold;
        }

        let Some(&(at_ms, severity)) = self.last.get(&signal.symbol) else {
            return Dispatch::Emitted;
        };

        let cooldown_ms = u64::try_from(self.settings.cooldown.as_millis()).unwrap_or(u64::MAX);
        let elapsed_ms = signal.emitted_ms.saturating_sub(at_ms);

        if elapsed_ms >= cooldown_ms {
            Dispatch::Emitted
        } else if signal.severity > severity {
            Dispatch::Escalated
        } else {
            Dispatch::Suppressed {
                remaining_ms: cooldown_ms - elapsed_ms,
            }
        }
    }

    /// Deliver the signal to the sink if the cooldown rules allow it.
    pub fn dispatch(&mut self, signal: CascadeSignal, summary: WindowSummary) -> Dispatch {
        let decision = self.decide(&signal);

        match decision {
            Dispatch::Emitted | Dispatch::Escalated => {
                if decision == Dispatch::Emitted {
                    self.stats.emitted += 1;
                } else {
                    self.stats.escalated += 1;
                }

                self.last
                    .insert(signal.symbol, (signal.emitted_ms, signal.severity));

                let time = i64::try_from(signal.emitted_ms)
                    .ok()
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .unwrap_or_else(Utc::now);

                self.sink.deliver(&Alert {
                    signal,
                    summary,
                    time,
                });
            }
            Dispatch::Suppressed { remaining_ms } => {
                self.stats.suppressed += 1;
                debug!(
                    symbol = %signal.symbol_name,
                    severity = %signal.severity,
                    remaining_ms,
                    "alert suppressed by cooldown"
                );
            }
            Dispatch::BelowThreshold => {}
        }

        decision
    }

    /// Drop cooldown state of a symbol that is no longer tracked.
    pub fn forget(&mut self, symbol: SymbolId) {
        self.last.remove(&symbol);
    }

    pub fn last_delivered(&self, symbol: SymbolId) -> Option<(u64, Severity)> {
        self.last.get(&symbol).copied()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }
}
