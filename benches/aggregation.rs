//! Benchmarks for indicator computation and signal aggregation

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures_bot::config::StrategyConfig;
use futures_bot::feed::{Indicators, MarketSnapshot};
use futures_bot::strategy::StrategyManager;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn history(len: usize) -> (Vec<Decimal>, Vec<Decimal>) {
    let closes = (0..len)
        .map(|i| dec!(50000) + Decimal::from((i * 37) % 400) - dec!(200) + Decimal::from(i))
        .collect();
    let volumes = (0..len).map(|i| dec!(100) + Decimal::from(i % 25)).collect();
    (closes, volumes)
}

fn benchmark_indicators(c: &mut Criterion) {
    let (closes, volumes) = history(150);

    c.bench_function("indicators_150_bars", |b| {
        b.iter(|| Indicators::compute(black_box(&closes), black_box(&volumes)))
    });
}

fn benchmark_aggregation(c: &mut Criterion) {
    let manager = StrategyManager::from_config(&StrategyConfig::default());
    let (closes, volumes) = history(150);
    let snapshot = MarketSnapshot::from_history("XBTUSDTM", closes, volumes, Utc::now());

    c.bench_function("aggregate_default_strategies", |b| {
        b.iter(|| manager.evaluate(black_box("XBTUSDTM"), black_box(&snapshot)))
    });
}

criterion_group!(benches, benchmark_indicators, benchmark_aggregation);
criterion_main!(benches);
