use super::backend::ArchiveStore;
use crate::scorer::CascadeSignal;
use cascade_data::{
    model::{ExchangeId, Side, decimal::PackedDecimal, event::LiquidationEvent},
    shutdown::Shutdown,
};
use cascade_integration::backoff::{ReconnectPolicy, duration_ms};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub enabled: bool,
    /// JSON lines file records are appended to.
    pub path: Option<String>,
    /// Records queued beyond this drop the oldest queued record.
    pub queue_capacity: usize,
    pub batch_size: usize,
    /// Attempts to rewrite a failed batch before its records are dropped.
    pub max_retries: u32,
    pub retry: ReconnectPolicy,
    /// Time allowed to drain the queue on shutdown.
    #[serde(with = "duration_ms", rename = "drain_timeout_ms")]
    pub drain_timeout: Duration,
    /// Interval at which the current signal of every active symbol is archived.
    #[serde(with = "duration_ms", rename = "signal_snapshot_interval_ms")]
    pub signal_snapshot_interval: Duration,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Some("cascade-archive.jsonl".to_string()),
            queue_capacity: 65_536,
            batch_size: 512,
            max_retries: 5,
            retry: ReconnectPolicy {
                base: Duration::from_millis(250),
                cap: Duration::from_secs(5),
            },
            drain_timeout: Duration::from_secs(5),
            signal_snapshot_interval: Duration::from_secs(60),
        }
    }
}

/// Liquidation in its archived form, with the symbol name resolved.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ArchivedLiquidation {
    pub time_ms: u64,
    pub exchange: ExchangeId,
    pub symbol: SmolStr,
    pub side: Side,
    pub price: PackedDecimal,
    pub quantity: PackedDecimal,
    pub notional_usd: u32,
}

impl ArchivedLiquidation {
    pub fn new(symbol: SmolStr, event: &LiquidationEvent) -> Self {
        Self {
            time_ms: event.time_ms(),
            exchange: event.exchange(),
            symbol,
            side: event.side(),
            price: event.price(),
            quantity: event.quantity(),
            notional_usd: event.notional_usd(),
        }
    }
}

/// One line of the cold tier.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveRecord {
    Liquidation(ArchivedLiquidation),
    Signal(CascadeSignal),
}

#[derive(Debug, Default)]
struct ArchiveHealth {
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_failed: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct ArchiveHealthSnapshot {
    pub enqueued: u64,
    pub written: u64,
    /// Records evicted from a full queue.
    pub dropped_overflow: u64,
    /// Records abandoned after exhausting write retries, or left over at shutdown.
    pub dropped_failed: u64,
    pub write_failures: u64,
    pub queued: usize,
}

#[derive(Debug)]
struct QueueInner {
    records: Mutex<VecDeque<ArchiveRecord>>,
    capacity: usize,
    notify: Notify,
    health: ArchiveHealth,
}

/// Bounded hand-off between the engine & the [`ArchiveWorker`].
///
/// Pushing never blocks or awaits: when full the oldest queued record is dropped & counted.
#[derive(Debug, Clone)]
pub struct ArchiveQueue {
    inner: Arc<QueueInner>,
}

impl ArchiveQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                capacity,
                notify: Notify::new(),
                health: ArchiveHealth::default(),
            }),
        }
    }

    pub fn push(&self, record: ArchiveRecord) {
        let dropped = {
            let mut records = self.inner.records.lock();
            let dropped = if records.len() >= self.inner.capacity {
                records.pop_front().is_some()
            } else {
                false
            };
            records.push_back(record);
            dropped
        };

        self.inner.health.enqueued.fetch_add(1, Ordering::Relaxed);
        if dropped {
            let total = self
                .inner
                .health
                .dropped_overflow
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            if total.is_power_of_two() {
                warn!(dropped = total, "archive queue full, dropping oldest records");
            }
        }

        self.inner.notify.notify_one();
    }

    /// Remove up to `max` of the oldest queued records.
    pub fn take(&self, max: usize) -> Vec<ArchiveRecord> {
        let mut records = self.inner.records.lock();
        let count = max.min(records.len());
        records.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Resolve once at least one record is queued.
    pub async fn ready(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn health(&self) -> ArchiveHealthSnapshot {
        let health = &self.inner.health;
        ArchiveHealthSnapshot {
            enqueued: health.enqueued.load(Ordering::Relaxed),
            written: health.written.load(Ordering::Relaxed),
            dropped_overflow: health.dropped_overflow.load(Ordering::Relaxed),
            dropped_failed: health.dropped_failed.load(Ordering::Relaxed),
            write_failures: health.write_failures.load(Ordering::Relaxed),
            queued: self.len(),
        }
    }

    fn record_written(&self, count: usize) {
        self.inner
            .health
            .written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.inner
            .health
            .write_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self, count: usize) {
        self.inner
            .health
            .dropped_failed
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Drains an [`ArchiveQueue`] into an [`ArchiveStore`] in batches, retrying failed writes
/// with backoff.
#[derive(Debug)]
pub struct ArchiveWorker<Store> {
    queue: ArchiveQueue,
    store: Store,
    batch_size: usize,
    max_retries: u32,
    retry: ReconnectPolicy,
    drain_timeout: Duration,
}

impl<Store> ArchiveWorker<Store>
where
    Store: ArchiveStore,
{
    pub fn new(queue: ArchiveQueue, store: Store, settings: &ArchiveSettings) -> Self {
        Self {
            queue,
            store,
            batch_size: settings.batch_size.max(1),
            max_retries: settings.max_retries,
            retry: settings.retry,
            drain_timeout: settings.drain_timeout,
        }
    }

    /// Run until shutdown, then drain whatever is queued within the drain timeout.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Store {
        info!(batch_size = self.batch_size, "archive worker running");
        let queue = self.queue.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = queue.ready() => {}
            }
            self.flush_pending().await;
        }

        let drained = tokio::time::timeout(self.drain_timeout, self.flush_pending()).await;
        match drained {
            Ok(()) => info!("archive queue drained"),
            Err(_) => {
                let abandoned = self.queue.take(usize::MAX).len();
                self.queue.record_dropped(abandoned);
                warn!(abandoned, "archive drain timed out, abandoning queued records");
            }
        }

        if let Err(error) = self.store.flush().await {
            error!(%error, "failed to flush archive store");
        }

        let health = self.queue.health();
        info!(
            written = health.written,
            dropped_overflow = health.dropped_overflow,
            dropped_failed = health.dropped_failed,
            "archive worker stopped"
        );
        self.store
    }

    /// Write batches until the queue is empty.
    pub async fn flush_pending(&mut self) {
        loop {
            let batch = self.queue.take(self.batch_size);
            if batch.is_empty() {
                return;
            }
            self.write_with_retry(&batch).await;
        }
    }

    async fn write_with_retry(&mut self, batch: &[ArchiveRecord]) {
        let mut backoff = self.retry.backoff();

        loop {
            match self.store.write_batch(batch).await {
                Ok(()) => {
                    self.queue.record_written(batch.len());
                    debug!(records = batch.len(), "archived batch");
                    return;
                }
                Err(error) => {
                    self.queue.record_failure();

                    if backoff.attempt() >= self.max_retries {
                        self.queue.record_dropped(batch.len());
                        error!(
                            %error,
                            records = batch.len(),
                            attempts = backoff.attempt() + 1,
                            "archive write failed, dropping batch"
                        );
                        return;
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        %error,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "archive write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
