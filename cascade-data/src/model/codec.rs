use super::{
    ExchangeId, Side,
    decimal::PackedDecimal,
    event::{LiquidationEvent, MAX_TIME_MS},
    symbol::SymbolId,
};
use bytes::{Buf, BufMut};
use thiserror::Error;

/// Size in bytes of one encoded [`LiquidationEvent`].
///
/// ```text
/// offset  size  field
/// 0       6     time_ms (u48 LE)
/// 6       4     price (packed decimal LE)
/// 10      4     quantity (packed decimal LE)
/// 14      2     symbol id (LE)
/// 16      1     exchange tag
/// 17      1     flags (bit 0: side, 0 = long, 1 = short)
/// ```
pub const ENCODED_LEN: usize = 18;

const FLAG_SHORT: u8 = 0b0000_0001;
const FLAG_RESERVED: u8 = !FLAG_SHORT;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum CodecError {
    #[error("buffer too short: {actual} < 18 bytes")]
    Truncated { actual: usize },

    #[error("unknown exchange tag: {0}")]
    UnknownExchange(u8),

    #[error("unknown flags: {0:#010b}")]
    UnknownFlags(u8),
}

/// Append the fixed-width encoding of `event` to `buffer`.
pub fn encode<B: BufMut>(event: &LiquidationEvent, buffer: &mut B) {
    debug_assert!(event.time_ms() <= MAX_TIME_MS);
    buffer.put_uint_le(event.time_ms(), 6);
    buffer.put_u32_le(event.price().raw());
    buffer.put_u32_le(event.quantity().raw());
    buffer.put_u16_le(event.symbol().0);
    buffer.put_u8(event.exchange().as_u8());
    buffer.put_u8(match event.side() {
        Side::Long => 0,
        Side::Short => FLAG_SHORT,
    });
}

/// Decode one [`LiquidationEvent`] from the front of `buffer`, advancing it by
/// [`ENCODED_LEN`] bytes on success.
pub fn decode<B: Buf>(buffer: &mut B) -> Result<LiquidationEvent, CodecError> {
    if buffer.remaining() < ENCODED_LEN {
        return Err(CodecError::Truncated {
            actual: buffer.remaining(),
        });
    }

    let time_ms = buffer.get_uint_le(6);
    let price = PackedDecimal::from_raw(buffer.get_u32_le());
    let quantity = PackedDecimal::from_raw(buffer.get_u32_le());
    let symbol = SymbolId(buffer.get_u16_le());

    let exchange_tag = buffer.get_u8();
    let exchange = ExchangeId::from_u8(exchange_tag).ok_or(CodecError::UnknownExchange(exchange_tag))?;

    let flags = buffer.get_u8();
    if flags & FLAG_RESERVED != 0 {
        return Err(CodecError::UnknownFlags(flags));
    }
    let side = if flags & FLAG_SHORT == 0 {
        Side::Long
    } else {
        Side::Short
    };

    Ok(LiquidationEvent::new(
        exchange, symbol, side, price, quantity, time_ms,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(exchange: ExchangeId, side: Side) -> LiquidationEvent {
        LiquidationEvent::new(
            exchange,
            SymbolId(513),
            side,
            PackedDecimal::from_decimal(dec!(64123.7)).unwrap(),
            PackedDecimal::from_decimal(dec!(1.337)).unwrap(),
            1_718_000_123_456,
        )
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let events = [
            event(ExchangeId::BinanceFuturesUsd, Side::Long),
            event(ExchangeId::DydxV4, Side::Short),
        ];

        let mut buffer = Vec::new();
        for event in &events {
            encode(event, &mut buffer);
        }
        assert_eq!(buffer.len(), 2 * ENCODED_LEN);

        let mut slice = buffer.as_slice();
        for expected in &events {
            let actual = decode(&mut slice).unwrap();
            assert_eq!(&actual, expected);
            assert_eq!(actual.notional_usd(), expected.notional_usd());
        }
        assert!(slice.is_empty());
    }

    #[test]
    fn test_decode_errors() {
        struct TestCase {
            input: Vec<u8>,
            expected: CodecError,
        }

        let mut valid = Vec::new();
        encode(&event(ExchangeId::Okx, Side::Long), &mut valid);

        let mut bad_exchange = valid.clone();
        bad_exchange[16] = 42;

        let mut bad_flags = valid.clone();
        bad_flags[17] = 0b1000_0000;

        let tests = vec![
            TestCase {
                // TC0: truncated buffer
                input: valid[..10].to_vec(),
                expected: CodecError::Truncated { actual: 10 },
            },
            TestCase {
                // TC1: unknown exchange tag
                input: bad_exchange,
                expected: CodecError::UnknownExchange(42),
            },
            TestCase {
                // TC2: reserved flag bits set
                input: bad_flags,
                expected: CodecError::UnknownFlags(0b1000_0000),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = decode(&mut test.input.as_slice()).unwrap_err();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
