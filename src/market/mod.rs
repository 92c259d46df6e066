//! Markets turn the aggregate order flow of one epoch into a single log-return.
//!
//! Every market implementation keeps the same [Ledger] of per-epoch history: trading volume,
//! order flow, the short-term terms (jitter and surge) and their exponentially decayed
//! counterparts (dispersion and sentiment). Implementations differ only in how the random part of
//! the return is drawn, which is why the flow terms are computed once by [Ledger::terms] and
//! shared.
//!
//! A market is a plain state machine and contains no synchronization. It is owned by an
//! [Exchange](crate::exchange::Exchange) which serializes every call to
//! [MarketModel::update_state] with the trades that feed it.
pub mod catalog;
pub mod fractal;
pub mod gaussian;
mod stats;

use derive_more::{Display, Error};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::exchange::Accounts;

pub type Epoch = usize;

/// Number of nonzero historical volumes required before volume is normalized against history.
const MIN_VOLUME_SAMPLES: usize = 3;
const VOLUME_PERCENTILE: f64 = 90.0;
/// Upper bound on game length. Every account and the ledger preallocate one slot per epoch.
pub const MAX_EPOCHS: Epoch = 100_000;

#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum MarketError {
    #[display("market has already run all {epochs} epochs")]
    EpochExhausted { epochs: Epoch },
    #[display("invalid market parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[display("invalid return distribution: mean {mean}, std {std}")]
    Distribution { mean: f64, std: f64 },
    #[display("unknown simulator {name}")]
    UnknownSimulator { name: String },
}

/// Result of advancing a market by one epoch.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Step {
    pub epoch: Epoch,
    pub log_return: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MarketParams {
    pub epochs: Epoch,
    pub volatility: f64,
    pub decay: f64,
    /// Only read by the fractal simulator.
    pub hurst: f64,
    pub seed: Option<u64>,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            epochs: 100,
            volatility: 0.01,
            decay: 0.7,
            hurst: 0.7,
            seed: None,
        }
    }
}

impl MarketParams {
    pub fn with_epochs(epochs: Epoch) -> Self {
        Self {
            epochs,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        if self.epochs == 0 || self.epochs > MAX_EPOCHS {
            return Err(MarketError::InvalidParameter {
                name: "epochs",
                value: self.epochs as f64,
            });
        }
        if !(self.volatility.is_finite() && self.volatility >= 0.0) {
            return Err(MarketError::InvalidParameter {
                name: "volatility",
                value: self.volatility,
            });
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(MarketError::InvalidParameter {
                name: "decay",
                value: self.decay,
            });
        }
        if !(self.hurst > 0.0 && self.hurst < 1.0) {
            return Err(MarketError::InvalidParameter {
                name: "hurst",
                value: self.hurst,
            });
        }
        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Buy and sell volume submitted for a single epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Volume {
    pub buy: f64,
    pub sell: f64,
}

impl Volume {
    /// Sums the orders every account placed for `epoch`. Players that abstained or traded flat
    /// do not contribute. Markets tally the epoch they are about to realize, the same slot
    /// [Exchange::trade](crate::exchange::Exchange::trade) writes to.
    pub fn tally(accounts: &Accounts, epoch: Epoch) -> Self {
        accounts
            .values()
            .filter_map(|account| account.position(epoch))
            .fold(Self::default(), |mut volume, position| {
                if position > 0 {
                    volume.buy += position as f64;
                } else if position < 0 {
                    volume.sell += position.unsigned_abs() as f64;
                }
                volume
            })
    }

    pub fn trading_volume(&self) -> f64 {
        self.buy + self.sell
    }

    pub fn order_flow(&self) -> f64 {
        self.buy - self.sell
    }
}

/// Deterministic part of an epoch, everything except the random draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Terms {
    pub trading_volume: f64,
    pub order_flow: f64,
    pub jitter: f64,
    pub surge: f64,
    pub dispersion: f64,
    pub sentiment: f64,
}

impl Terms {
    pub fn mean(&self) -> f64 {
        self.surge + self.sentiment
    }

    pub fn std(&self) -> f64 {
        self.jitter + self.dispersion
    }
}

/// Append-only per-epoch history. Every vector has `epochs + 1` slots and index 0 holds the
/// neutral starting state.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Ledger {
    pub trading_volume: Vec<f64>,
    pub order_flow: Vec<f64>,
    pub jitter: Vec<f64>,
    pub surge: Vec<f64>,
    pub dispersion: Vec<f64>,
    pub sentiment: Vec<f64>,
    pub log_return: Vec<f64>,
}

impl Ledger {
    pub fn new(epochs: Epoch) -> Self {
        let zeroed = vec![0.0; epochs + 1];
        Self {
            trading_volume: zeroed.clone(),
            order_flow: zeroed.clone(),
            jitter: zeroed.clone(),
            surge: zeroed.clone(),
            dispersion: zeroed.clone(),
            sentiment: zeroed.clone(),
            log_return: zeroed,
        }
    }

    /// 90th percentile of the nonzero volumes recorded strictly before `epoch`, or infinity when
    /// there is not enough history to normalize against.
    pub fn volume_percentile(&self, epoch: Epoch) -> f64 {
        let mut nonzero: Vec<f64> = self.trading_volume[..epoch]
            .iter()
            .copied()
            .filter(|volume| *volume != 0.0)
            .collect();
        if nonzero.len() < MIN_VOLUME_SAMPLES {
            return f64::INFINITY;
        }
        stats::percentile(&mut nonzero, VOLUME_PERCENTILE)
    }

    pub fn terms(&self, epoch: Epoch, volume: Volume, volatility: f64, decay: f64) -> Terms {
        let trading_volume = volume.trading_volume();
        let order_flow = volume.order_flow();

        let percentile = self.volume_percentile(epoch);
        let trading_volume_ratio = (trading_volume / percentile).min(1.0);
        let order_flow_ratio = (order_flow / percentile).clamp(-1.0, 1.0);

        // Thin markets are choppier, net pressure pushes the drift
        let jitter = volatility * (1.0 - trading_volume_ratio);
        let surge = 0.5 * volatility * order_flow_ratio;

        let dispersion = self.dispersion[epoch] * decay + jitter * (1.0 - decay);
        let sentiment = self.sentiment[epoch] * decay + surge * (1.0 - decay);

        Terms {
            trading_volume,
            order_flow,
            jitter,
            surge,
            dispersion,
            sentiment,
        }
    }

    pub fn record(&mut self, epoch: Epoch, terms: &Terms, log_return: f64) {
        self.trading_volume[epoch] = terms.trading_volume;
        self.order_flow[epoch] = terms.order_flow;
        self.jitter[epoch] = terms.jitter;
        self.surge[epoch] = terms.surge;
        self.dispersion[epoch] = terms.dispersion;
        self.sentiment[epoch] = terms.sentiment;
        self.log_return[epoch] = log_return;
    }
}

/// A price-evolution algorithm.
///
/// `update_state` is the only mutating operation: it must either fail without touching any state
/// or advance `epoch` by exactly one and record the returned log-return at the new epoch.
pub trait MarketModel: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;
    fn epoch(&self) -> Epoch;
    fn epochs(&self) -> Epoch;
    fn ledger(&self) -> &Ledger;
    fn update_state(&mut self, accounts: &Accounts) -> Result<Step, MarketError>;

    /// Realized log-returns from epoch 0 up to and including the current epoch.
    fn log_returns(&self) -> &[f64] {
        &self.ledger().log_return[..=self.epoch()]
    }

    fn is_exhausted(&self) -> bool {
        self.epoch() >= self.epochs()
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, MarketError, MarketParams, Volume, MAX_EPOCHS};
    use crate::exchange::{Account, Accounts};

    #[test]
    fn test_that_volume_tally_splits_buys_and_sells() {
        let mut accounts = Accounts::new();
        let mut long = Account::new(10);
        long.set_position(1, 10);
        let mut short = Account::new(10);
        short.set_position(1, -5);
        let mut flat = Account::new(10);
        flat.set_position(1, 0);
        accounts.insert("long".to_string(), long);
        accounts.insert("short".to_string(), short);
        accounts.insert("flat".to_string(), flat);
        accounts.insert("idle".to_string(), Account::new(10));

        let volume = Volume::tally(&accounts, 1);
        assert_eq!(volume.buy, 10.0);
        assert_eq!(volume.sell, 5.0);
        assert_eq!(volume.order_flow(), 5.0);
        assert_eq!(volume.trading_volume(), 15.0);

        let untouched = Volume::tally(&accounts, 2);
        assert_eq!(untouched, Volume::default());
    }

    #[test]
    fn test_that_percentile_is_unbounded_without_history() {
        let mut ledger = Ledger::new(10);
        ledger.trading_volume[1] = 4.0;
        ledger.trading_volume[2] = 8.0;
        assert!(ledger.volume_percentile(3).is_infinite());

        ledger.trading_volume[3] = 12.0;
        // index 3 is not strictly before epoch 3
        assert!(ledger.volume_percentile(3).is_infinite());
        assert!(ledger.volume_percentile(4).is_finite());
    }

    #[test]
    fn test_that_zero_volumes_are_ignored_by_percentile() {
        let mut ledger = Ledger::new(10);
        ledger.trading_volume[1] = 10.0;
        ledger.trading_volume[3] = 10.0;
        ledger.trading_volume[5] = 10.0;
        assert_eq!(ledger.volume_percentile(6), 10.0);
    }

    #[test]
    fn test_that_invalid_params_are_rejected() {
        let mut params = MarketParams::with_epochs(10);
        assert!(params.validate().is_ok());

        params.decay = 1.0;
        assert!(matches!(
            params.validate(),
            Err(MarketError::InvalidParameter { name: "decay", .. })
        ));
        params.decay = 0.0;
        assert!(matches!(
            params.validate(),
            Err(MarketError::InvalidParameter { name: "decay", .. })
        ));

        let zero = MarketParams::with_epochs(0);
        assert!(zero.validate().is_err());

        let hurst = MarketParams {
            hurst: 1.0,
            ..MarketParams::default()
        };
        assert!(hurst.validate().is_err());
    }

    #[test]
    fn test_that_oversized_games_are_rejected_before_allocating() {
        assert!(MarketParams::with_epochs(MAX_EPOCHS).validate().is_ok());
        for epochs in [MAX_EPOCHS + 1, usize::MAX] {
            assert!(matches!(
                MarketParams::with_epochs(epochs).validate(),
                Err(MarketError::InvalidParameter { name: "epochs", .. })
            ));
        }
    }
}
