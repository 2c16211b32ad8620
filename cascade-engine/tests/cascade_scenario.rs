use cascade_data::{
    adapter::{AdapterStream, health::AdapterHealth},
    context::MarketReading,
    model::{
        ExchangeId, Side,
        decimal::PackedDecimal,
        event::{Ingested, LiquidationEvent},
        symbol::{SymbolId, SymbolTable},
    },
    router::{EventRouter, RouterSettings},
    shutdown::shutdown_channel,
};
use cascade_engine::{
    config::CascadeConfig,
    dispatcher::Dispatch,
    engine::CascadeEngine,
    scorer::{Severity, SubScores, saturate},
    sink::{Alert, AlertSink},
};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc;

const T0: u64 = 1_700_000_100_000;

#[derive(Debug, Clone, Default)]
struct Collect(Arc<Mutex<Vec<Alert>>>);

impl AlertSink for Collect {
    fn deliver(&mut self, alert: &Alert) {
        self.0.lock().push(alert.clone());
    }
}

fn long_liquidation(symbol: SymbolId, exchange: ExchangeId, time_ms: u64) -> LiquidationEvent {
    // 50_000 * 4 = $200k
    LiquidationEvent::new(
        exchange,
        symbol,
        Side::Long,
        PackedDecimal::from_decimal(dec!(50000)).unwrap(),
        PackedDecimal::from_decimal(dec!(4)).unwrap(),
        time_ms,
    )
}

fn new_engine(config: &CascadeConfig) -> (CascadeEngine<Collect>, Collect, SymbolId) {
    let symbols = Arc::new(SymbolTable::new());
    let btc = symbols.intern("BTC").unwrap();
    let sink = Collect::default();
    let engine = CascadeEngine::new(config, symbols, None, sink.clone());
    (engine, sink, btc)
}

#[test]
fn test_ten_million_long_burst_in_five_seconds() {
    let config = CascadeConfig::default();
    let (mut engine, sink, btc) = new_engine(&config);

    engine.on_context(&[funding_reading(T0, 0.0)], T0);

    for index in 0..50 {
        let time_ms = T0 + index * 100;
        engine.on_event(
            &long_liquidation(btc, ExchangeId::BinanceFuturesUsd, time_ms),
            time_ms,
        );
    }

    let now_ms = T0 + 4_900;
    let signal = engine.score(btc, now_ms).unwrap();
    assert!(signal.context_fresh);
    assert!(signal.severity >= Severity::Moderate, "{signal:?}");
    assert!((0.0..=1.0).contains(&signal.score));

    let velocity = engine.velocity(btc).unwrap();
    let five_seconds = velocity.window(5_000).unwrap();
    assert_eq!(five_seconds.sample.totals.count(), 50);
    assert_eq!(five_seconds.sample.totals.long_notional_usd, 10_000_000);
    assert!(saturate(five_seconds.sample.events_per_sec, 10.0) >= 0.95);
    assert!(signal.sub_scores.velocity >= 0.95);

    let alerts = sink.0.lock();
    let last = alerts.last().unwrap();
    assert_eq!(last.signal.symbol_name, "BTC");
    assert!(last.signal.severity >= Severity::Moderate);
    assert_eq!(last.summary.short_count, 0);
}

#[test]
fn test_stale_context_weight_is_redistributed() {
    let config = CascadeConfig::default();
    let weights = config.scorer.weights;

    let sub_scores = SubScores {
        velocity: 0.8,
        acceleration: 0.3,
        correlation: 0.5,
        market: None,
    };
    let remaining = weights.velocity + weights.acceleration + weights.correlation;
    let expected = (weights.velocity * 0.8 + weights.acceleration * 0.3 + weights.correlation * 0.5)
        / remaining;
    assert!((sub_scores.combine(&weights) - expected).abs() < 1e-12);

    // same burst, context older than the staleness limit
    let (mut engine, _, btc) = new_engine(&config);
    for index in 0..10 {
        let time_ms = T0 + index * 100;
        engine.on_event(&long_liquidation(btc, ExchangeId::Okx, time_ms), time_ms);
    }

    engine.on_context(&[funding_reading(T0, 0.01)], T0);
    assert_eq!(engine.score(btc, T0 + 1_000).unwrap().sub_scores.market, Some(0.4));

    let now_ms = T0 + config.scorer.market.staleness_ms + 1;
    let signal = engine.score(btc, now_ms).unwrap();
    assert!(!signal.context_fresh);
    assert_eq!(signal.sub_scores.market, None);
}

#[test]
fn test_cooldown_and_escalation() {
    let config = CascadeConfig::default();
    let (mut engine, sink, btc) = new_engine(&config);

    // a first modest burst alerts once
    let mut outcomes = Vec::new();
    for index in 0..20 {
        let time_ms = T0 + index * 250;
        outcomes.push(engine.on_event(&long_liquidation(btc, ExchangeId::Okx, time_ms), time_ms));
    }
    let first = sink.0.lock().len();
    assert!(first >= 1);

    // the same intensity ten seconds later is suppressed
    for index in 0..20 {
        let time_ms = T0 + 10_000 + index * 250;
        outcomes.push(engine.on_event(&long_liquidation(btc, ExchangeId::Okx, time_ms), time_ms));
    }
    assert!(
        outcomes
            .iter()
            .any(|outcome| matches!(outcome, Dispatch::Suppressed { .. }))
    );

    // every delivered alert raised the severity over the previous one inside the cooldown
    let severities = sink
        .0
        .lock()
        .iter()
        .map(|alert| alert.signal.severity)
        .collect::<Vec<_>>();
    assert!(severities.windows(2).all(|pair| pair[0] < pair[1]), "{severities:?}");

    // after the cooldown the next burst alerts again
    let after = T0 + 20_000 + config.dispatcher.cooldown.as_millis() as u64;
    for index in 0..20 {
        let time_ms = after + index * 250;
        engine.on_event(&long_liquidation(btc, ExchangeId::Okx, time_ms), time_ms);
    }
    assert!(sink.0.lock().len() > severities.len());
}

#[test]
fn test_cross_exchange_burst_scores_correlation() {
    let config = CascadeConfig::default();
    let (mut engine, _, btc) = new_engine(&config);

    let exchanges = [
        ExchangeId::BinanceFuturesUsd,
        ExchangeId::BybitPerpetualsUsd,
        ExchangeId::Okx,
    ];
    for index in 0..30_u64 {
        let time_ms = T0 + index * 100;
        let exchange = exchanges[(index % 3) as usize];
        engine.on_event(&long_liquidation(btc, exchange, time_ms), time_ms);
    }

    let signal = engine.score(btc, T0 + 2_900).unwrap();
    assert!((signal.sub_scores.correlation - 1.0).abs() < 1e-9);
    assert!(signal.severity >= Severity::High, "{signal:?}");
}

#[tokio::test]
async fn test_duplicates_reach_the_engine_once() {
    let config = CascadeConfig::default();
    let (engine, _, btc) = new_engine(&config);

    let mut router = EventRouter::new(RouterSettings::default());
    let rx = router.subscribe();

    let (tx, events) = mpsc::channel(64);
    router.attach(AdapterStream {
        exchange: ExchangeId::BybitPerpetualsUsd,
        events,
        health: Arc::new(AdapterHealth::new(ExchangeId::BybitPerpetualsUsd, 100)),
        task: tokio::spawn(async {}),
    });

    let (_trigger, shutdown) = shutdown_channel();
    let engine_task = tokio::spawn(engine.run(rx, None, shutdown));

    let now = cascade_data::now_ms();
    for (seq, offset) in [(1, 0), (2, 100), (1, 0), (3, 200), (2, 100)] {
        tx.send(Ingested {
            event: long_liquidation(btc, ExchangeId::BybitPerpetualsUsd, now + offset),
            source_seq: Some(seq),
            received_ms: now,
        })
        .await
        .unwrap();
    }
    drop(tx);

    router.join().await;

    let engine = engine_task.await.unwrap();
    assert_eq!(engine.stats().events, 3);
    assert_eq!(engine.liquidations_since(btc, 0).count(), 3);
}

fn funding_reading(time_ms: u64, funding_rate: f64) -> MarketReading {
    MarketReading {
        symbol: "BTC".into(),
        time: chrono::DateTime::from_timestamp_millis(time_ms as i64).unwrap(),
        open_interest: Some(80_000.0),
        open_interest_usd: None,
        funding_rate: Some(funding_rate),
    }
}
