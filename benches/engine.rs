//! Order book performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rust_decimal::Decimal;
use spot_venue::market_data_gen::{replay_into_book, Generator, GeneratorConfig, OrderAction};
use spot_venue::{AccountId, MarketId, OrderBook, OrderId, Side};

fn actions(seed: u64, n: usize, limit_ratio: f64, cancel_ratio: f64) -> Vec<OrderAction> {
    Generator::new(GeneratorConfig {
        seed,
        num_actions: n,
        limit_ratio,
        cancel_ratio,
        ..Default::default()
    })
    .all_actions()
}

fn bench_replay_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("order_book");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("replay_1000_mixed", |b| {
        b.iter_batched(
            || (OrderBook::new(MarketId::new("ETH")), actions(42, N, 0.7, 0.1)),
            |(mut book, actions)| {
                replay_into_book(&mut book, actions).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    const RESTING: usize = 500;
    const CANCELS_PER_ITER: usize = 100;
    let mut group = c.benchmark_group("order_book");
    group.throughput(Throughput::Elements(CANCELS_PER_ITER as u64));
    group.bench_function("cancel_100_after_500_resting", |b| {
        b.iter_batched(
            || {
                let mut book = OrderBook::new(MarketId::new("ETH"));
                let outcome = replay_into_book(&mut book, actions(123, RESTING, 1.0, 0.0)).unwrap();
                let ids: Vec<OrderId> = outcome.limit_order_ids()[..CANCELS_PER_ITER].to_vec();
                (book, ids)
            },
            |(mut book, ids)| {
                for id in ids {
                    book.cancel(id);
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_market_sweep(c: &mut Criterion) {
    const LEVELS: i64 = 200;
    let mut group = c.benchmark_group("order_book");
    group.throughput(Throughput::Elements(LEVELS as u64));
    group.bench_function("market_sweep_200_levels", |b| {
        b.iter_batched(
            || {
                let mut book = OrderBook::new(MarketId::new("ETH"));
                for p in 0..LEVELS {
                    let order = book
                        .create_order(Side::Ask, Decimal::from(5), AccountId(1))
                        .unwrap();
                    book.place_limit(order, Decimal::from(100 + p)).unwrap();
                }
                let taker = book
                    .create_order(Side::Bid, Decimal::from(5 * LEVELS), AccountId(2))
                    .unwrap();
                (book, taker)
            },
            |(mut book, mut taker)| {
                let matches = book.place_market(&mut taker).unwrap();
                assert_eq!(matches.len(), LEVELS as usize);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_replay_throughput, bench_cancel, bench_market_sweep);
criterion_main!(benches);
