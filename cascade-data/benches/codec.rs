use cascade_data::model::{
    ExchangeId, Side,
    codec::{ENCODED_LEN, decode, encode},
    decimal::PackedDecimal,
    event::LiquidationEvent,
    symbol::SymbolId,
};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;

fn events(count: u64) -> Vec<LiquidationEvent> {
    let price = PackedDecimal::from_decimal(dec!(64123.5)).expect("price packs");
    let quantity = PackedDecimal::from_decimal(dec!(0.125)).expect("quantity packs");

    (0..count)
        .map(|index| {
            LiquidationEvent::new(
                ExchangeId::ALL[(index % 6) as usize],
                SymbolId((index % 32) as u16),
                if index % 2 == 0 { Side::Long } else { Side::Short },
                price,
                quantity,
                1_700_000_000_000 + index,
            )
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let events = events(10_000);

    let mut encoded = Vec::with_capacity(events.len() * ENCODED_LEN);
    for event in &events {
        encode(event, &mut encoded);
    }

    let mut group = c.benchmark_group("liquidation_codec");
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("encode", |b| {
        let mut buffer = Vec::with_capacity(encoded.len());
        b.iter(|| {
            buffer.clear();
            for event in &events {
                encode(black_box(event), &mut buffer);
            }
        })
    });

    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut slice = black_box(encoded.as_slice());
            while !slice.is_empty() {
                black_box(decode(&mut slice).expect("decodes"));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
