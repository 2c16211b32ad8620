use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display as FmtDisplay, Formatter};

/// [`PackedDecimal`](decimal::PackedDecimal) fixed point price & quantity representation.
pub mod decimal;

/// [`LiquidationEvent`](event::LiquidationEvent) & the [`Ingested`](event::Ingested) envelope
/// adapters hand to the router.
pub mod event;

/// Interned [`SymbolId`](symbol::SymbolId)s & venue symbol normalisation.
pub mod symbol;

/// Fixed-width binary encoding of a [`LiquidationEvent`](event::LiquidationEvent).
pub mod codec;

/// Unique identifier for every venue a liquidation can originate from.
///
/// The discriminant is stable and used as the on-wire exchange tag.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ExchangeId {
    BinanceFuturesUsd = 0,
    BybitPerpetualsUsd = 1,
    Okx = 2,
    Bitmex = 3,
    Hyperliquid = 4,
    DydxV4 = 5,
}

impl ExchangeId {
    /// Every supported venue, in tag order.
    pub const ALL: [ExchangeId; 6] = [
        ExchangeId::BinanceFuturesUsd,
        ExchangeId::BybitPerpetualsUsd,
        ExchangeId::Okx,
        ExchangeId::Bitmex,
        ExchangeId::Hyperliquid,
        ExchangeId::DydxV4,
    ];

    /// Return the &str representation of this [`ExchangeId`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::BinanceFuturesUsd => "binance_futures_usd",
            ExchangeId::BybitPerpetualsUsd => "bybit_perpetuals_usd",
            ExchangeId::Okx => "okx",
            ExchangeId::Bitmex => "bitmex",
            ExchangeId::Hyperliquid => "hyperliquid",
            ExchangeId::DydxV4 => "dydx_v4",
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }
}

impl FmtDisplay for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which position was forcibly closed.
///
/// `Long` means a long position was liquidated (selling pressure), `Short` means a short
/// position was liquidated (buying pressure).
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    #[display("long")]
    Long = 0,
    #[display("short")]
    Short = 1,
}

/// Aggressor side of an order or trade as published by a venue.
///
/// Venues disagree on casing & vocabulary ("Buy", "BUY", "buy", "B", "bid"), so deserialisation
/// is lenient.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
pub enum OrderSide {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl<'de> Deserialize<'de> for OrderSide {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: &str = Deserialize::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "buy" | "b" | "bid" => Ok(OrderSide::Buy),
            "sell" | "s" | "a" | "ask" => Ok(OrderSide::Sell),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["buy", "sell", "b", "a", "bid", "ask"],
            )),
        }
    }
}
