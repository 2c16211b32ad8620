use crate::{engine::EngineStatsSnapshot, store::archive::ArchiveHealthSnapshot};
use cascade_data::{adapter::health::HealthSnapshot, router::RouterStatsSnapshot};
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, warn};

/// Point in time health of the whole pipeline, from venue connections to the cold tier.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct HealthReport {
    pub time_ms: u64,
    pub adapters: Vec<HealthSnapshot>,
    pub router: RouterStatsSnapshot,
    pub archive: Option<ArchiveHealthSnapshot>,
    pub engine: EngineStatsSnapshot,
}

impl HealthReport {
    pub fn connected(&self) -> usize {
        self.adapters
            .iter()
            .filter(|adapter| adapter.connected)
            .count()
    }

    /// Adapters currently disconnected, eg/ "okx,bitmex".
    pub fn disconnected(&self) -> String {
        self.adapters
            .iter()
            .filter(|adapter| !adapter.connected)
            .map(|adapter| adapter.exchange)
            .join(",")
    }

    pub fn log(&self) {
        info!(
            connected = self.connected(),
            adapters = self.adapters.len(),
            received = self.router.received,
            duplicates = self.router.duplicates,
            events = self.engine.events,
            lagged = self.engine.lagged,
            alerts = self.engine.alerts.emitted + self.engine.alerts.escalated,
            archived = self.archive.map(|archive| archive.written),
            archive_dropped = self
                .archive
                .map(|archive| archive.dropped_overflow + archive.dropped_failed),
            "pipeline health"
        );

        if self.connected() < self.adapters.len() {
            warn!(exchanges = %self.disconnected(), "exchange adapters disconnected");
        }
    }
}
