use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use super::{Epoch, Ledger, MarketError, MarketModel, MarketParams, Step, Volume};
use crate::exchange::Accounts;

/// Draws each epoch's log-return from a normal distribution whose mean follows net order flow and
/// whose standard deviation shrinks as trading volume rises relative to recent history.
#[derive(Debug)]
pub struct Gaussian {
    epoch: Epoch,
    epochs: Epoch,
    volatility: f64,
    decay: f64,
    ledger: Ledger,
    rng: StdRng,
}

impl Gaussian {
    pub const NAME: &'static str = "gaussian";

    pub fn new(params: &MarketParams) -> Result<Self, MarketError> {
        params.validate()?;
        Ok(Self {
            epoch: 0,
            epochs: params.epochs,
            volatility: params.volatility,
            decay: params.decay,
            ledger: Ledger::new(params.epochs),
            rng: params.rng(),
        })
    }

    pub fn boxed(params: &MarketParams) -> Result<Box<dyn MarketModel>, MarketError> {
        Ok(Box::new(Self::new(params)?))
    }
}

impl MarketModel for Gaussian {
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

        let (mean, std) = (terms.mean(), terms.std());
        let dist = Normal::new(mean, std).map_err(|_| MarketError::Distribution { mean, std })?;
        let log_return = dist.sample(&mut self.rng);

        self.epoch += 1;
        self.ledger.record(self.epoch, &terms, log_return);
        Ok(Step {
            epoch: self.epoch,
            log_return,
        })
    }
}
