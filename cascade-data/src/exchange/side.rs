use crate::model::{OrderSide, Side};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, StrExt};

/// Hyperliquid liquidator vault that takes over backstop liquidations.
pub const HYPERLIQUID_LIQUIDATOR: &str = "0x2e3d94f0562703b25c83308a05046ddaf9a8dd14";

/// Raw side information a venue attaches to a liquidation (or candidate liquidation) print.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SideHint {
    /// Order side as published, optionally with an explicit position direction.
    Order {
        side: OrderSide,
        position: Option<Side>,
    },
    /// Both counterparties of an on-chain fill.
    Counterparties { buyer: SmolStr, seller: SmolStr },
}

impl SideHint {
    pub fn order(side: OrderSide) -> Self {
        Self::Order {
            side,
            position: None,
        }
    }
}

/// Strategy for deciding which position a venue print liquidated.
///
/// Chosen once per adapter at construction, so the per-message path is a single match.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideDetector {
    /// The side is that of the forced close order: a sell closes a long. An explicit
    /// position direction takes precedence when present.
    OrderSide,

    /// The side names the liquidated position: "Buy" means a long was liquidated.
    PositionSide,

    /// Prints are only liquidations if a known liquidator address is a counterparty. The
    /// liquidator buying means a long was liquidated.
    Counterparty { liquidators: Vec<SmolStr> },
}

impl SideDetector {
    pub fn counterparty<I, S>(liquidators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Counterparty {
            liquidators: liquidators
                .into_iter()
                .map(|address| address.as_ref().to_lowercase_smolstr())
                .collect(),
        }
    }

    /// Determine the liquidated [`Side`], or `None` if the print is not a liquidation.
    pub fn detect(&self, hint: &SideHint) -> Option<Side> {
        match (self, hint) {
            (SideDetector::OrderSide, SideHint::Order { position: Some(side), .. }) => Some(*side),
            (SideDetector::OrderSide, SideHint::Order { side, .. }) => Some(match side {
                OrderSide::Sell => Side::Long,
                OrderSide::Buy => Side::Short,
            }),
            (SideDetector::PositionSide, SideHint::Order { side, .. }) => Some(match side {
                OrderSide::Buy => Side::Long,
                OrderSide::Sell => Side::Short,
            }),
            (SideDetector::Counterparty { liquidators }, SideHint::Counterparties { buyer, seller }) => {
                let is_liquidator = |address: &SmolStr| {
                    liquidators
                        .iter()
                        .any(|liquidator| liquidator.eq_ignore_ascii_case(address))
                };

                match (is_liquidator(buyer), is_liquidator(seller)) {
                    (true, false) => Some(Side::Long),
                    (false, true) => Some(Side::Short),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
