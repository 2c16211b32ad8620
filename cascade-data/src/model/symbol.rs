use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, StrExt};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Quote currencies stripped from concatenated venue symbols (eg/ "BTCUSDT").
const QUOTE_SUFFIXES: [&str; 5] = ["USDT", "USDC", "FDUSD", "BUSD", "USD"];

/// Compact handle for an interned base asset symbol (eg/ "BTC").
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
pub struct SymbolId(pub u16);

impl Display for SymbolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("symbol table is full ({0} symbols)")]
pub struct SymbolTableFull(pub usize);

/// Normalise a venue instrument name to its base asset.
///
/// ```text
/// BTCUSDT        -> BTC   (Binance, Bybit)
/// BTC-USDT-SWAP  -> BTC   (Okx)
/// XBTUSD         -> BTC   (BitMEX)
/// BTC-USD        -> BTC   (dYdX)
/// btc            -> BTC   (Hyperliquid coin)
/// ```
pub fn normalise_symbol(raw: &str) -> SmolStr {
    let upper = raw.trim().to_uppercase_smolstr();

    let base = match upper.split_once('-') {
        Some((base, _)) => base,
        None => QUOTE_SUFFIXES
            .iter()
            .find_map(|quote| {
                upper
                    .strip_suffix(quote)
                    .filter(|base| !base.is_empty())
            })
            .unwrap_or(upper.as_str()),
    };

    match base {
        "XBT" => SmolStr::new_static("BTC"),
        base => SmolStr::new(base),
    }
}

/// Thread-safe interner mapping base asset symbols to [`SymbolId`]s.
///
/// Ids are dense, assigned in first-seen order and never reused, so an id stays valid for the
/// lifetime of the table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    inner: RwLock<SymbolTableInner>,
}

#[derive(Debug, Default)]
struct SymbolTableInner {
    ids: FnvHashMap<SmolStr, SymbolId>,
    names: Vec<SmolStr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an already normalised symbol, returning its existing id if present.
    pub fn intern(&self, symbol: &str) -> Result<SymbolId, SymbolTableFull> {
        if let Some(id) = self.get(symbol) {
            return Ok(id);
        }

        let mut inner = self.inner.write();
        if let Some(id) = inner.ids.get(symbol) {
            return Ok(*id);
        }

        let next = inner.names.len();
        let id = u16::try_from(next)
            .map(SymbolId)
            .map_err(|_| SymbolTableFull(next))?;

        let name = SmolStr::new(symbol);
        inner.ids.insert(name.clone(), id);
        inner.names.push(name);
        Ok(id)
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolId> {
        self.inner.read().ids.get(symbol).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<SmolStr> {
        self.inner.read().names.get(usize::from(id.0)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
