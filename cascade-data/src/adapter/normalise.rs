use crate::{
    adapter::{DEFAULT_MAX_CLOCK_SKEW, health::AdapterHealth},
    error::DataError,
    exchange::{LiquidationIter, RawLiquidation, side::SideDetector},
    model::{
        ExchangeId,
        decimal::PackedDecimal,
        event::{Ingested, LiquidationEvent},
        symbol::{SymbolTable, normalise_symbol},
    },
};
use fnv::FnvHashSet;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};

/// Turns venue [`RawLiquidation`]s into [`Ingested`] events: detects the side, applies the
/// symbol filter, packs decimals & interns the symbol.
#[derive(Debug)]
pub struct Normaliser {
    exchange: ExchangeId,
    detector: SideDetector,
    symbols: Arc<SymbolTable>,
    monitored: Option<FnvHashSet<SmolStr>>,
    health: Arc<AdapterHealth>,
    max_clock_skew_ms: u64,
}

impl Normaliser {
    /// An empty `monitored` slice accepts every symbol.
    pub fn new(
        exchange: ExchangeId,
        detector: SideDetector,
        symbols: Arc<SymbolTable>,
        monitored: &[SmolStr],
        health: Arc<AdapterHealth>,
    ) -> Self {
        let monitored = (!monitored.is_empty())
            .then(|| monitored.iter().map(|symbol| normalise_symbol(symbol)).collect());

        Self {
            exchange,
            detector,
            symbols,
            monitored,
            health,
            max_clock_skew_ms: duration_to_ms(DEFAULT_MAX_CLOCK_SKEW),
        }
    }

    /// Reject liquidations stamped more than `skew` ahead of their receive time.
    pub fn with_max_clock_skew(self, skew: Duration) -> Self {
        Self {
            max_clock_skew_ms: duration_to_ms(skew),
            ..self
        }
    }

    pub fn health(&self) -> &Arc<AdapterHealth> {
        &self.health
    }

    /// Normalise one [`RawLiquidation`]. `Ok(None)` means the print was filtered out (not a
    /// liquidation, or an unmonitored symbol) and is not an error.
    pub fn normalise(
        &self,
        raw: RawLiquidation,
        received_ms: u64,
    ) -> Result<Option<Ingested>, DataError> {
        let Some(side) = self.detector.detect(&raw.hint) else {
            return Ok(None);
        };

        let symbol = normalise_symbol(&raw.market);
        if let Some(monitored) = &self.monitored {
            if !monitored.contains(&symbol) {
                return Ok(None);
            }
        }

        let price = PackedDecimal::from_decimal(raw.price).map_err(|error| DataError::Pack {
            field: "price",
            error,
        })?;
        let quantity =
            PackedDecimal::from_decimal(raw.quantity).map_err(|error| DataError::Pack {
                field: "quantity",
                error,
            })?;

        if price.is_zero() || quantity.is_zero() {
            return Err(DataError::Malformed {
                exchange: self.exchange,
                reason: format!("zero price or quantity for {}", raw.market),
            });
        }

        let time_ms = u64::try_from(raw.time.timestamp_millis()).map_err(|_| {
            DataError::Malformed {
                exchange: self.exchange,
                reason: format!("timestamp before epoch: {}", raw.time),
            }
        })?;

        if time_ms > received_ms.saturating_add(self.max_clock_skew_ms) {
            return Err(DataError::Malformed {
                exchange: self.exchange,
                reason: format!(
                    "timestamp {time_ms} ahead of receive time {received_ms} for {}",
                    raw.market
                ),
            });
        }

        let symbol = self.symbols.intern(&symbol)?;

        Ok(Some(Ingested {
            event: LiquidationEvent::new(self.exchange, symbol, side, price, quantity, time_ms),
            source_seq: raw.seq,
            received_ms,
        }))
    }

    /// Normalise every parse result of one venue message, counting failures as malformed.
    pub fn normalise_all(&self, batch: LiquidationIter, received_ms: u64) -> Vec<Ingested> {
        batch
            .into_iter()
            .filter_map(|raw| match raw.and_then(|raw| self.normalise(raw, received_ms)) {
                Ok(ingested) => ingested,
                Err(error) => {
                    self.health.record_malformed(&error);
                    None
                }
            })
            .collect()
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
