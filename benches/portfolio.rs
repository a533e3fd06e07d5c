//! Portfolio benchmarks: estimation, optimization, allocation and the full
//! pipeline.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nanofolio::{
    AllocatorConfig, EfficientFrontier, EstimatorConfig, Frequency, OptimizerConfig,
    PortfolioRequest, PriceMatrix, PriceSeries, StaticPrices, Symbol, Weights, allocate,
    build_portfolio, estimate,
};

fn sym(s: &str) -> Symbol {
    Symbol::new(s)
}

/// Generate `n_stocks` synthetic close series of `n_bars` bars.
///
/// Prices start at $100 and drift randomly using a simple deterministic RNG.
fn generate_series(n_bars: usize, n_stocks: usize) -> Vec<PriceSeries> {
    // Simple deterministic PRNG (xorshift32)
    let mut rng_state: u32 = 42;

    (0..n_stocks)
        .map(|i| {
            let mut price = 100.0;
            let drift = 0.0002 * (i % 5) as f64;
            let closes: Vec<f64> = (0..n_bars)
                .map(|_| {
                    rng_state ^= rng_state << 13;
                    rng_state ^= rng_state >> 17;
                    rng_state ^= rng_state << 5;

                    // Random return between -2% and +2%
                    let ret = (rng_state % 401) as f64 / 10_000.0 - 0.02 + drift;
                    price = (price * (1.0 + ret)).max(1.0);
                    price
                })
                .collect();
            PriceSeries::from_closes(sym(&format!("S{i:03}")), &closes)
                .expect("generated prices are positive")
        })
        .collect()
}

fn provider(series: &[PriceSeries]) -> StaticPrices {
    let mut prices = StaticPrices::new();
    for s in series {
        prices.insert(s.clone());
    }
    prices
}

/// Benchmark: mean/covariance estimation, 1 year of daily bars
fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("portfolio/estimate");

    for n in [5, 20, 50] {
        let matrix = PriceMatrix::align(&generate_series(252, n)).expect("aligned");
        let config = EstimatorConfig::new(Frequency::Daily);
        group.bench_with_input(BenchmarkId::new("daily_252", n), &matrix, |b, m| {
            b.iter(|| black_box(estimate(m, &config)));
        });
    }

    group.finish();
}

/// Benchmark: max-Sharpe and min-volatility solves
fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("portfolio/optimize");

    for n in [5, 20, 50] {
        let matrix = PriceMatrix::align(&generate_series(252, n)).expect("aligned");
        let est = estimate(&matrix, &EstimatorConfig::new(Frequency::Daily)).expect("estimate");
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).expect("frontier");

        group.bench_with_input(BenchmarkId::new("max_sharpe", n), &ef, |b, ef| {
            b.iter(|| black_box(ef.max_sharpe()));
        });
        group.bench_with_input(BenchmarkId::new("min_volatility", n), &ef, |b, ef| {
            b.iter(|| black_box(ef.min_volatility()));
        });
    }

    group.finish();
}

/// Benchmark: whole-share allocation
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("portfolio/allocate");

    for n in [10, 100, 500] {
        let symbols: Vec<Symbol> = (0..n).map(|i| sym(&format!("S{i:03}"))).collect();
        let weights = Weights::equal(symbols.clone());
        let prices: Vec<(Symbol, f64)> = symbols
            .into_iter()
            .enumerate()
            .map(|(i, s)| (s, 5.0 + (i * 37 % 400) as f64))
            .collect();
        let config = AllocatorConfig::default();

        group.bench_with_input(BenchmarkId::new("budget_1m", n), &n, |b, _| {
            b.iter(|| black_box(allocate(&weights, &prices, 1_000_000.0, &config)));
        });
    }

    group.finish();
}

/// Benchmark: history through allocation for a 20-stock basket
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("portfolio/pipeline");

    let series = generate_series(252, 20);
    let symbols: Vec<Symbol> = series.iter().map(|s| s.symbol().clone()).collect();
    let prices = provider(&series);
    let request = PortfolioRequest::new(symbols, Frequency::Daily, 100_000.0);

    group.bench_function("20stocks_daily_1y", |b| {
        b.iter(|| black_box(build_portfolio(&request, &prices)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_estimate,
    bench_optimize,
    bench_allocate,
    bench_pipeline
);
criterion_main!(benches);
