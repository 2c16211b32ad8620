use crate::{
    adapter::{
        AdapterStream,
        health::{AdapterHealth, HealthSnapshot},
    },
    model::{ExchangeId, event::{Ingested, LiquidationEvent}},
    router::dedup::Deduplicator,
};
use cascade_integration::backoff::duration_ms;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info};

/// Seen-set based duplicate suppression.
pub mod dedup;

/// Default capacity of the fan-out broadcast channel.
pub const DEFAULT_ROUTER_CAPACITY: usize = 8192;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Broadcast channel capacity; subscribers lagging further behind lose the oldest events.
    pub capacity: usize,
    #[serde(with = "duration_ms", rename = "dedup_window_ms")]
    pub dedup_window: Duration,
    #[serde(with = "duration_ms", rename = "fingerprint_bucket_ms")]
    pub fingerprint_bucket: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ROUTER_CAPACITY,
            dedup_window: Duration::from_secs(10),
            fingerprint_bucket: Duration::from_secs(1),
        }
    }
}

/// Router wide counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    received: AtomicU64,
    duplicates: AtomicU64,
    published: AtomicU64,
    undelivered: AtomicU64,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct RouterStatsSnapshot {
    pub received: u64,
    pub duplicates: u64,
    pub published: u64,
    /// Published while no subscriber was attached.
    pub undelivered: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct AttachedAdapter {
    health: Arc<AdapterHealth>,
    adapter_task: JoinHandle<()>,
    fan_in_task: JoinHandle<()>,
}

/// Fans in every adapter, drops duplicates & publishes to all subscribers.
///
/// Each adapter gets its own fan-in task & [`Deduplicator`] (keys include the exchange, so
/// no state is shared), which keeps per-adapter order. Publishing uses a broadcast channel,
/// so a slow subscriber only ever loses its own oldest events and never stalls adapters or
/// other subscribers.
#[derive(Debug)]
pub struct EventRouter {
    settings: RouterSettings,
    tx: broadcast::Sender<LiquidationEvent>,
    stats: Arc<RouterStats>,
    adapters: Vec<AttachedAdapter>,
}

impl EventRouter {
    pub fn new(settings: RouterSettings) -> Self {
        let (tx, _) = broadcast::channel(settings.capacity.max(1));
        Self {
            settings,
            tx,
            stats: Arc::new(RouterStats::default()),
            adapters: Vec::new(),
        }
    }

    /// New subscriber receiving every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LiquidationEvent> {
        self.tx.subscribe()
    }

    pub fn attach(&mut self, stream: AdapterStream) {
        let AdapterStream {
            exchange,
            events,
            health,
            task,
        } = stream;

        let dedup = Deduplicator::new(
            duration_to_ms(self.settings.dedup_window),
            duration_to_ms(self.settings.fingerprint_bucket),
        );

        let fan_in_task = tokio::spawn(fan_in(
            exchange,
            events,
            dedup,
            self.tx.clone(),
            Arc::clone(&self.stats),
        ));

        info!(%exchange, "adapter attached to router");
        self.adapters.push(AttachedAdapter {
            health,
            adapter_task: task,
            fan_in_task,
        });
    }

    pub fn health(&self, now_ms: u64) -> Vec<HealthSnapshot> {
        self.adapters
            .iter()
            .map(|adapter| adapter.health.snapshot(now_ms))
            .collect()
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every adapter & fan-in task to finish. Adapters stop on the shared
    /// [`Shutdown`](crate::shutdown::Shutdown) signal; fan-in tasks drain what remains and
    /// then end, after which subscribers observe the channel closing.
    pub async fn join(self) {
        for adapter in self.adapters {
            let exchange = adapter.health.exchange();
            if let Err(error) = adapter.adapter_task.await {
                debug!(%exchange, %error, "adapter task aborted");
            }
            if let Err(error) = adapter.fan_in_task.await {
                debug!(%exchange, %error, "fan-in task aborted");
            }
        }
    }
}

async fn fan_in(
    exchange: ExchangeId,
    mut events: mpsc::Receiver<Ingested>,
    mut dedup: Deduplicator,
    tx: broadcast::Sender<LiquidationEvent>,
    stats: Arc<RouterStats>,
) {
    while let Some(ingested) = events.recv().await {
        stats.received.fetch_add(1, Ordering::Relaxed);

        if !dedup.is_unique(&ingested) {
            stats.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(%exchange, seq = ?ingested.source_seq, "dropped duplicate liquidation");
            continue;
        }

        stats.published.fetch_add(1, Ordering::Relaxed);
        if tx.send(ingested.event).is_err() {
            stats.undelivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!(%exchange, "adapter stream ended");
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Side, decimal::PackedDecimal, symbol::SymbolId};
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn ingested(seq: Option<u64>, time_ms: u64) -> Ingested {
        Ingested {
            event: LiquidationEvent::new(
                ExchangeId::BybitPerpetualsUsd,
                SymbolId(1),
                Side::Short,
                PackedDecimal::from_raw(64_000),
                PackedDecimal::from_raw(2),
                time_ms,
            ),
            source_seq: seq,
            received_ms: time_ms,
        }
    }

    fn adapter_stream(capacity: usize) -> (mpsc::Sender<Ingested>, AdapterStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = AdapterStream {
            exchange: ExchangeId::BybitPerpetualsUsd,
            events: rx,
            health: Arc::new(AdapterHealth::new(ExchangeId::BybitPerpetualsUsd, 100)),
            task: tokio::spawn(async {}),
        };
        (tx, stream)
    }

    #[tokio::test]
    async fn test_router_publishes_duplicates_once() {
        let mut router = EventRouter::new(RouterSettings::default());
        let mut subscriber = router.subscribe();

        let (tx, stream) = adapter_stream(16);
        router.attach(stream);

        tx.send(ingested(None, 1_000)).await.unwrap();
        tx.send(ingested(None, 1_000)).await.unwrap();
        tx.send(ingested(Some(9), 1_500)).await.unwrap();
        tx.send(ingested(Some(9), 1_600)).await.unwrap();
        drop(tx);

        assert_eq!(subscriber.recv().await.unwrap().time_ms(), 1_000);
        assert_eq!(subscriber.recv().await.unwrap().time_ms(), 1_500);

        let stats = router.stats.clone();
        router.join().await;
        assert!(matches!(subscriber.recv().await, Err(RecvError::Closed)));

        let stats = stats.snapshot();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.published, 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let mut router = EventRouter::new(RouterSettings {
            capacity: 4,
            ..RouterSettings::default()
        });
        let mut slow = router.subscribe();
        let mut fast = router.subscribe();

        let (tx, stream) = adapter_stream(64);
        router.attach(stream);

        for seq in 0..10 {
            tx.send(ingested(Some(seq), 1_000 + seq)).await.unwrap();
            let event = fast.recv().await.unwrap();
            assert_eq!(event.time_ms(), 1_000 + seq);
        }
        drop(tx);
        router.join().await;

        // The slow subscriber lost its oldest events but sees the most recent ones
        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(6))));
        assert_eq!(slow.recv().await.unwrap().time_ms(), 1_006);
        let mut remaining = 1;
        while slow.try_recv().is_ok() {
            remaining += 1;
        }
        assert_eq!(remaining, 4);
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Closed)));
    }
}
