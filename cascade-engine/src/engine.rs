use crate::{
    config::CascadeConfig,
    context::{MarketContextSnapshot, MarketContextTracker},
    dispatcher::{Dispatch, DispatchStats, SignalDispatcher},
    scorer::{CascadeScorer, CascadeSignal, Severity},
    sink::{AlertSink, WindowSummary},
    state::window::WindowTotals,
    store::{TieredStore, archive::ArchiveQueue},
    velocity::{VelocityCalculator, VelocitySnapshot},
};
use cascade_data::{
    context::MarketReading,
    error::DataError,
    model::{
        event::LiquidationEvent,
        symbol::{SymbolId, SymbolTable},
    },
    now_ms,
    shutdown::Shutdown,
};
use fnv::FnvHashMap;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use itertools::Itertools;
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::broadcast::{Receiver, error::RecvError},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

/// Interval at which idle windows are decayed.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Stream of market context polls fed to [`CascadeEngine::run`].
pub type ContextStream = BoxStream<'static, Result<Vec<MarketReading>, DataError>>;

/// Engine counters, shared so they can be read while the engine task runs.
#[derive(Debug, Default)]
pub struct EngineStats {
    events: AtomicU64,
    lagged: AtomicU64,
    evictions: AtomicU64,
    context_updates: AtomicU64,
    context_failures: AtomicU64,
    emitted: AtomicU64,
    escalated: AtomicU64,
    suppressed: AtomicU64,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct EngineStatsSnapshot {
    pub events: u64,
    /// Events skipped because the engine fell behind the router.
    pub lagged: u64,
    pub evictions: u64,
    pub context_updates: u64,
    pub context_failures: u64,
    pub alerts: DispatchStats,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            context_updates: self.context_updates.load(Ordering::Relaxed),
            context_failures: self.context_failures.load(Ordering::Relaxed),
            alerts: DispatchStats {
                emitted: self.emitted.load(Ordering::Relaxed),
                escalated: self.escalated.load(Ordering::Relaxed),
                suppressed: self.suppressed.load(Ordering::Relaxed),
            },
        }
    }

    fn record_dispatch(&self, dispatch: Dispatch) {
        let counter = match dispatch {
            Dispatch::Emitted => &self.emitted,
            Dispatch::Escalated => &self.escalated,
            Dispatch::Suppressed { .. } => &self.suppressed,
            Dispatch::BelowThreshold => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Single owner of all per-symbol detection state: applies liquidations & market context,
/// scores the affected symbol & hands signals to the dispatcher.
///
/// Everything is synchronous & driven by one task, so no locking is needed on the hot path.
#[derive(Debug)]
pub struct CascadeEngine<Sink> {
    symbols: Arc<SymbolTable>,
    calculator: VelocityCalculator,
    store: TieredStore,
    scorer: CascadeScorer,
    dispatcher: SignalDispatcher<Sink>,
    tracker: MarketContextTracker,
    contexts: FnvHashMap<SymbolId, MarketContextSnapshot>,
    stats: Arc<EngineStats>,
    tick_lag_ms: u64,
    snapshot_interval_ms: u64,
    last_snapshot_ms: u64,
}

impl<Sink> CascadeEngine<Sink>
where
    Sink: AlertSink,
{
    pub fn new(
        config: &CascadeConfig,
        symbols: Arc<SymbolTable>,
        archive: Option<ArchiveQueue>,
        sink: Sink,
    ) -> Self {
        Self {
            calculator: VelocityCalculator::new(
                &config.velocity,
                &config.store.hot,
                config.scorer.correlation.window_ms,
            ),
            store: TieredStore::new(&config.store, Arc::clone(&symbols), archive),
            scorer: CascadeScorer::new(config.scorer.clone(), config.velocity.windows.clone()),
            dispatcher: SignalDispatcher::new(config.dispatcher, sink),
            tracker: MarketContextTracker::new(config.context.funding_flat_epsilon),
            contexts: FnvHashMap::default(),
            stats: Arc::new(EngineStats::default()),
            tick_lag_ms: u64::try_from(config.velocity.tick_lag.as_millis()).unwrap_or(u64::MAX),
            snapshot_interval_ms: u64::try_from(
                config.store.archive.signal_snapshot_interval.as_millis(),
            )
            .unwrap_or(u64::MAX),
            last_snapshot_ms: 0,
            symbols,
        }
    }

    /// Apply a liquidation, then score & possibly alert on its symbol.
    pub fn on_event(&mut self, event: &LiquidationEvent, now_ms: u64) -> Dispatch {
        self.stats.events.fetch_add(1, Ordering::Relaxed);

        if let Some(evicted) = self.calculator.observe(event) {
            self.forget(evicted);
        }
        self.store.record(event);

        self.evaluate(event.symbol(), now_ms)
    }

    /// Apply a batch of market context readings & rescore every resident symbol they cover.
    pub fn on_context(&mut self, readings: &[MarketReading], now_ms: u64) {
        for reading in readings {
            let snapshot = self.tracker.update(reading);

            let symbol = match self.symbols.intern(&reading.symbol) {
                Ok(symbol) => symbol,
                Err(error) => {
                    warn!(symbol = %reading.symbol, %error, "ignoring market context");
                    continue;
                }
            };

            debug!(
                symbol = %snapshot.symbol,
                funding_rate = ?snapshot.funding_rate,
                funding_trend = %snapshot.funding_trend,
                oi_change_1m = ?snapshot.oi_change_pct[0],
                "market context updated"
            );
            self.contexts.insert(symbol, snapshot);
            self.stats.context_updates.fetch_add(1, Ordering::Relaxed);

            if self.calculator.state(symbol).is_some() {
                self.evaluate(symbol, now_ms);
            }
        }
    }

    /// Decay idle windows up to `now_ms` minus the tick lag & periodically archive the signal
    /// of every active symbol.
    ///
    /// `now_ms` is wall time whereas symbol clocks follow exchange event time, hence the lag.
    pub fn on_tick(&mut self, now_ms: u64) {
        self.calculator.advance_all(now_ms.saturating_sub(self.tick_lag_ms));

        if now_ms.saturating_sub(self.last_snapshot_ms) < self.snapshot_interval_ms {
            return;
        }
        self.last_snapshot_ms = now_ms;

        let active = self
            .calculator
            .registry()
            .symbols()
            .filter_map(|symbol| self.score(symbol, now_ms))
            .filter(|signal| signal.severity >= Severity::Low)
            .collect::<Vec<_>>();

        if !active.is_empty() {
            info!(
                symbols = %active
                    .iter()
                    .map(|signal| format!("{}={}", signal.symbol_name, signal.severity))
                    .join(","),
                "archiving active cascade signals"
            );
        }
        for signal in &active {
            self.store.archive_signal(signal);
        }
    }

    /// Current signal of a resident symbol.
    pub fn score(&self, symbol: SymbolId, now_ms: u64) -> Option<CascadeSignal> {
        self.score_with_summary(symbol, now_ms)
            .map(|(signal, _)| signal)
    }

    /// Current velocity & acceleration of every window of a resident symbol.
    pub fn velocity(&self, symbol: SymbolId) -> Option<VelocitySnapshot> {
        self.calculator.snapshot(symbol)
    }

    /// Latest `limit` hot tier liquidations of a symbol, oldest first.
    pub fn recent_events(&self, symbol: SymbolId, limit: usize) -> Vec<LiquidationEvent> {
        self.calculator
            .state(symbol)
            .map(|state| {
                let events = state.events();
                events
                    .iter()
                    .skip(events.len().saturating_sub(limit))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Warm tier totals since `since_ms`.
    pub fn liquidations_since(&self, symbol: SymbolId, since_ms: u64) -> WindowTotals {
        self.store.liquidations_since(symbol, since_ms)
    }

    pub fn context(&self, symbol: SymbolId) -> Option<&MarketContextSnapshot> {
        self.contexts.get(&symbol)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn dispatcher(&self) -> &SignalDispatcher<Sink> {
        &self.dispatcher
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    /// Consume liquidations & market context until shutdown or the router closes.
    pub async fn run(
        mut self,
        mut events: Receiver<LiquidationEvent>,
        context: Option<ContextStream>,
        mut shutdown: Shutdown,
    ) -> Self {
        info!("cascade engine running");

        let mut context = context.unwrap_or_else(|| stream::pending().boxed()).fuse();
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("shutdown requested, stopping cascade engine");
                    break;
                }

                event = events.recv() => match event {
                    Ok(event) => {
                        self.on_event(&event, now_ms());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        self.stats.lagged.fetch_add(missed, Ordering::Relaxed);
                        warn!(missed, "cascade engine lagging behind router, liquidations skipped");
                    }
                    Err(RecvError::Closed) => {
                        info!("router closed, stopping cascade engine");
                        break;
                    }
                },

                Some(readings) = context.next() => match readings {
                    Ok(readings) => self.on_context(&readings, now_ms()),
                    Err(error) => {
                        self.stats.context_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(%error, "market context unavailable, scoring without it");
                    }
                },

                _ = tick.tick() => self.on_tick(now_ms()),
            }
        }

        self
    }

    fn evaluate(&mut self, symbol: SymbolId, now_ms: u64) -> Dispatch {
        let Some((signal, summary)) = self.score_with_summary(symbol, now_ms) else {
            return Dispatch::BelowThreshold;
        };

        let dispatch = self.dispatcher.dispatch(signal, summary);
        self.stats.record_dispatch(dispatch);
        dispatch
    }

    fn score_with_summary(
        &self,
        symbol: SymbolId,
        now_ms: u64,
    ) -> Option<(CascadeSignal, WindowSummary)> {
        let velocity = self.calculator.snapshot(symbol)?;
        let name = self.symbols.name(symbol).unwrap_or_default();

        let signal = self
            .scorer
            .score(name, &velocity, self.contexts.get(&symbol), now_ms);

        let summary = velocity
            .window(signal.trigger_window_ms)
            .map(|reading| WindowSummary::from_totals(reading.window_ms, &reading.sample.totals))
            .unwrap_or_default();

        Some((signal, summary))
    }

    fn forget(&mut self, symbol: SymbolId) {
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        self.store.forget(symbol);
        self.dispatcher.forget(symbol);
        self.contexts.remove(&symbol);
        debug!(%symbol, "evicted idle symbol");
    }
}
