use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use super::{Epoch, Ledger, MarketError, MarketModel, MarketParams, Step, Volume};
use crate::exchange::Accounts;

/// Fractional Gaussian noise generated one sample at a time with Hosking's method.
///
/// Each new sample is conditioned on every previous one through the Durbin-Levinson
/// recursion, so the noise can be produced online as the game advances instead of being
/// precomputed for the whole run.
#[derive(Debug)]
struct Hosking {
    hurst: f64,
    samples: Vec<f64>,
    // phi_{n,1..n} for the latest n
    coefficients: Vec<f64>,
    variance: f64,
}

impl Hosking {
    fn new(hurst: f64, capacity: usize) -> Self {
        Self {
            hurst,
            samples: Vec::with_capacity(capacity),
            coefficients: Vec::with_capacity(capacity),
            variance: 1.0,
        }
    }

    fn autocovariance(&self, lag: usize) -> f64 {
        let h2 = 2.0 * self.hurst;
        let k = lag as f64;
        0.5 * ((k + 1.0).powf(h2) - 2.0 * k.powf(h2) + (k - 1.0).abs().powf(h2))
    }

    fn next(&mut self, innovation: f64) -> f64 {
        let n = self.samples.len();
        if n == 0 {
            let sample = innovation * self.autocovariance(0).sqrt();
            self.samples.push(sample);
            return sample;
        }

        let projected: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(j, phi)| phi * self.autocovariance(n - j - 1))
            .sum();
        let reflection = (self.autocovariance(n) - projected) / self.variance;

        let previous = self.coefficients.clone();
        for (j, phi) in self.coefficients.iter_mut().enumerate() {
            *phi -= reflection * previous[n - j - 2];
        }
        self.coefficients.push(reflection);
        self.variance = (self.variance * (1.0 - reflection * reflection)).max(0.0);

        let mean: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(j, phi)| phi * self.samples[n - j - 1])
            .sum();
        let sample = mean + self.variance.sqrt() * innovation;
        self.samples.push(sample);
        sample
    }
}

/// Same flow terms as [Gaussian](super::gaussian::Gaussian) but the noise is long-memory:
/// with `hurst > 0.5` shocks persist across epochs, below 0.5 they tend to reverse.
#[derive(Debug)]
pub struct Fractal {
    epoch: Epoch,
    epochs: Epoch,
    volatility: f64,
    decay: f64,
    ledger: Ledger,
    noise: Hosking,
    rng: StdRng,
}

impl Fractal {
    pub const NAME: &'static str = "fractal";

    pub fn new(params: &MarketParams) -> Result<Self, MarketError> {
        params.validate()?;
        Ok(Self {
            epoch: 0,
            epochs: params.epochs,
            volatility: params.volatility,
            decay: params.decay,
            ledger: Ledger::new(params.epochs),
            noise: Hosking::new(params.hurst, params.epochs),
            rng: params.rng(),
        })
    }

    pub fn boxed(params: &MarketParams) -> Result<Box<dyn MarketModel>, MarketError> {
        Ok(Box::new(Self::new(params)?))
    }
}

impl MarketModel for Fractal {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn epochs(&self) -> Epoch {
        self.epochs
    }

    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn update_state(&mut self, accounts: &Accounts) -> Result<Step, MarketError> {
        if self.is_exhausted() {
            return Err(MarketError::EpochExhausted {
                epochs: self.epochs,
            });
        }

        let volume = Volume::tally(accounts, self.epoch + 1);
        let terms = self
            .ledger
            .terms(self.epoch, volume, self.volatility, self.decay);

        let innovation: f64 = StandardNormal.sample(&mut self.rng);
        let shock = self.noise.next(innovation);
        let log_return = terms.mean() + terms.std() * shock;
        if !log_return.is_finite() {
            return Err(MarketError::Distribution {
                mean: terms.mean(),
                std: terms.std(),
            });
        }

        self.epoch += 1;
        self.ledger.record(self.epoch, &terms, log_return);
        Ok(Step {
            epoch: self.epoch,
            log_return,
        })
    }
}
