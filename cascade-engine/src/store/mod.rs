use self::{
    archive::{
        ArchiveHealthSnapshot, ArchiveQueue, ArchiveRecord, ArchiveSettings, ArchivedLiquidation,
    },
    warm::{WarmStore, WarmTierSettings},
};
use crate::{
    scorer::CascadeSignal,
    state::{HotTierSettings, window::WindowTotals},
};
use cascade_data::model::{
    event::LiquidationEvent,
    symbol::{SymbolId, SymbolTable},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cold tier records, queue & background writer.
pub mod archive;

/// [`ArchiveStore`](backend::ArchiveStore) implementations.
pub mod backend;

/// Per-symbol time bucket aggregates.
pub mod warm;

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    pub hot: HotTierSettings,
    pub warm: WarmTierSettings,
    pub archive: ArchiveSettings,
}

/// Warm & cold tiers behind one write path. The hot tier lives in the
/// [`VelocityCalculator`](crate::velocity::VelocityCalculator).
///
/// Recording never blocks on cold tier IO: archive records are queued for the
/// [`ArchiveWorker`](archive::ArchiveWorker).
#[derive(Debug)]
pub struct TieredStore {
    warm: WarmStore,
    archive: Option<ArchiveQueue>,
    symbols: Arc<SymbolTable>,
}

impl TieredStore {
    pub fn new(
        settings: &StoreSettings,
        symbols: Arc<SymbolTable>,
        archive: Option<ArchiveQueue>,
    ) -> Self {
        Self {
            warm: WarmStore::new(&settings.warm),
            archive,
            symbols,
        }
    }

    pub fn record(&mut self, event: &LiquidationEvent) {
        self.warm.record(event);

        if let Some(queue) = &self.archive {
            let name = self.symbols.name(event.symbol()).unwrap_or_default();
            queue.push(ArchiveRecord::Liquidation(ArchivedLiquidation::new(name, event)));
        }
    }

    pub fn archive_signal(&self, signal: &CascadeSignal) {
        if let Some(queue) = &self.archive {
            queue.push(ArchiveRecord::Signal(signal.clone()));
        }
    }

    pub fn liquidations_since(&self, symbol: SymbolId, since_ms: u64) -> WindowTotals {
        self.warm.liquidations_since(symbol, since_ms)
    }

    pub fn warm(&self) -> &WarmStore {
        &self.warm
    }

    pub fn forget(&mut self, symbol: SymbolId) {
        self.warm.forget(symbol);
    }

    pub fn archive_health(&self) -> Option<ArchiveHealthSnapshot> {
        self.archive.as_ref().map(ArchiveQueue::health)
    }
}
