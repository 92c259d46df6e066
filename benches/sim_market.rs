use criterion::{criterion_group, criterion_main, Criterion};

use mayhem::exchange::ExchangeBuilder;
use mayhem::market::fractal::Fractal;
use mayhem::market::gaussian::Gaussian;
use mayhem::market::{MarketModel, MarketParams};

const PLAYERS: usize = 20;
const EPOCHS: usize = 500;

fn market_loop(market: Box<dyn MarketModel>) {
    let exchange = ExchangeBuilder::new()
        .with_market(market)
        .with_leverage_cap(None)
        .build()
        .unwrap();
    for player in 0..PLAYERS {
        exchange.add_player_account(format!("player{player}")).unwrap();
    }

    for epoch in 0..EPOCHS {
        for player in 0..PLAYERS {
            let position = if (player + epoch) % 3 == 0 { -2 } else { 1 };
            exchange
                .trade(&format!("player{player}"), position)
                .unwrap();
        }
        exchange.update_market().unwrap();
    }
}

fn gaussian_core_loop() {
    let params = MarketParams {
        epochs: EPOCHS,
        seed: Some(1),
        ..MarketParams::default()
    };
    market_loop(Gaussian::boxed(&params).unwrap());
}

fn fractal_core_loop() {
    let params = MarketParams {
        epochs: EPOCHS,
        seed: Some(1),
        ..MarketParams::default()
    };
    market_loop(Fractal::boxed(&params).unwrap());
}

fn benchmarks(c: &mut Criterion) {
    c.bench_function("gaussian market loop", |b| b.iter(gaussian_core_loop));
    c.bench_function("fractal market loop", |b| b.iter(fractal_core_loop));
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
