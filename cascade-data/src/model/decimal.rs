use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use thiserror::Error;

const MANTISSA_BITS: u32 = 28;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;
const MAX_SCALE: u32 = 15;

const POW10: [f64; 16] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15,
];

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum PackError {
    #[error("negative values cannot be packed: {0}")]
    Negative(Decimal),

    #[error("value exceeds packed decimal range: {0}")]
    OutOfRange(Decimal),
}

/// Non-negative fixed point decimal packed into 32 bits.
///
/// The upper 4 bits hold the decimal scale (0..=15) and the lower 28 bits the mantissa
/// (0..=268_435_455), giving ~8 significant digits. Values with more precision are rounded
/// half-even to the nearest representable value when packed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct PackedDecimal(u32);

impl PackedDecimal {
    pub const ZERO: Self = Self(0);

    /// Largest integral value that packs without losing magnitude.
    pub const MAX_MANTISSA: u32 = MANTISSA_MASK;

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn mantissa(&self) -> u32 {
        self.0 & MANTISSA_MASK
    }

    pub fn scale(&self) -> u32 {
        self.0 >> MANTISSA_BITS
    }

    /// Pack a [`Decimal`], rounding away excess precision.
    pub fn from_decimal(value: Decimal) -> Result<Self, PackError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PackError::Negative(value));
        }

        let mut value = value.normalize();
        if value.scale() > MAX_SCALE {
            value = value
                .round_dp_with_strategy(MAX_SCALE, RoundingStrategy::MidpointNearestEven)
                .normalize();
        }

        loop {
            let mantissa = value.mantissa();
            let scale = value.scale();

            if mantissa <= i128::from(MANTISSA_MASK) {
                let mantissa = u32::try_from(mantissa.unsigned_abs())
                    .map_err(|_| PackError::OutOfRange(value))?;
                return Ok(Self((scale << MANTISSA_BITS) | mantissa));
            }

            if scale == 0 {
                return Err(PackError::OutOfRange(value));
            }

            value = value
                .round_dp_with_strategy(scale - 1, RoundingStrategy::MidpointNearestEven)
                .normalize();
        }
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(i64::from(self.mantissa()), self.scale())
    }

    pub fn to_f64(&self) -> f64 {
        f64::from(self.mantissa()) / POW10[self.scale() as usize]
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa() == 0
    }
}

impl TryFrom<Decimal> for PackedDecimal {
    type Error = PackError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<PackedDecimal> for Decimal {
    fn from(value: PackedDecimal) -> Self {
        value.to_decimal()
    }
}

impl Display for PackedDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl std::fmt::Debug for PackedDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedDecimal({})", self.to_decimal())
    }
}

impl Serialize for PackedDecimal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for PackedDecimal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let decimal = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::from_decimal(decimal).map_err(serde::de::Error::custom)
    }
}

/// Multiply two packed values into whole US dollars, saturating at `u32::MAX`.
pub fn notional_usd(price: PackedDecimal, quantity: PackedDecimal) -> u32 {
    let notional = price.to_decimal() * quantity.to_decimal();
    notional
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(u32::MAX)
}
