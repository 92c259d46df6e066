//! The exchange is the only way into a game's market: it owns the market and every player
//! account and puts all of them behind a single lock.
//!
//! A single lock, rather than one per account, is required because
//! [update_market](Exchange::update_market) reads every account while computing volume and must
//! never observe a half-applied trade. Each game has its own exchange, so independent games never
//! contend with each other.
//!
//! Trades are always written one epoch ahead of the market. A trade that returns before
//! `update_market` starts is counted in that update; a trade racing an update lands on whichever
//! side of the lock it wins, which is harmless because the epoch it targets has not been realized
//! yet.
mod account;
mod builder;

pub use account::{Account, Accounts, PlayerKey};
pub use builder::{ExchangeBuilder, DEFAULT_LEVERAGE_CAP, DEFAULT_START_PRICE};

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use derive_more::{Display, Error};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::market::{Epoch, Ledger, MarketError, MarketModel, Step};

#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum ExchangeError {
    #[display("unknown player {player_key}")]
    UnknownPlayer { player_key: PlayerKey },
    #[display("account {player_key} already exists")]
    DuplicateAccount { player_key: PlayerKey },
    #[display("order of {position} with leverage {leverage} breaches the limit of {cap}")]
    ExposureLimit {
        leverage: i64,
        position: i64,
        cap: i64,
    },
    #[display("order of {position} overflows leverage {leverage}")]
    LeverageOverflow { leverage: i64, position: i64 },
    #[display("market closed after epoch {epoch}")]
    MarketClosed { epoch: Epoch },
    Market(MarketError),
    #[display("exchange state poisoned by an earlier panic")]
    Poisoned,
}

impl From<MarketError> for ExchangeError {
    fn from(value: MarketError) -> Self {
        ExchangeError::Market(value)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct TradeReceipt {
    pub epoch: Epoch,
    pub leverage: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct LatestPrice {
    pub epoch: Epoch,
    pub price: f64,
}

/// Consistent copy of everything needed to rebuild a game's history, taken under the exchange
/// lock.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExchangeSnapshot {
    pub simulator: String,
    pub epoch: Epoch,
    pub epochs: Epoch,
    pub start_price: f64,
    pub sum_log_return: f64,
    pub ledger: Ledger,
    pub accounts: Accounts,
}

impl ExchangeSnapshot {
    /// Realized log-returns, index 0 through the snapshot's epoch.
    pub fn log_returns(&self) -> &[f64] {
        &self.ledger.log_return[..=self.epoch]
    }
}

#[derive(Debug)]
struct ExchangeInner {
    accounts: Accounts,
    market: Box<dyn MarketModel>,
    sum_log_return: f64,
}

#[derive(Debug)]
pub struct Exchange {
    start_price: f64,
    leverage_cap: Option<i64>,
    inner: Mutex<ExchangeInner>,
}

impl Exchange {
    fn lock(&self) -> Result<MutexGuard<'_, ExchangeInner>, ExchangeError> {
        self.inner.lock().map_err(|_| ExchangeError::Poisoned)
    }

    pub fn start_price(&self) -> f64 {
        self.start_price
    }

    pub fn leverage_cap(&self) -> Option<i64> {
        self.leverage_cap
    }

    /// Returns `(epoch, epochs)`.
    pub fn clock(&self) -> Result<(Epoch, Epoch), ExchangeError> {
        let inner = self.lock()?;
        Ok((inner.market.epoch(), inner.market.epochs()))
    }

    pub fn has_player(&self, player_key: &str) -> Result<bool, ExchangeError> {
        Ok(self.lock()?.accounts.contains_key(player_key))
    }

    pub fn add_player_account(&self, player_key: impl Into<PlayerKey>) -> Result<(), ExchangeError> {
        let player_key = player_key.into();
        let mut inner = self.lock()?;
        if inner.accounts.contains_key(&player_key) {
            return Err(ExchangeError::DuplicateAccount { player_key });
        }
        let account = Account::new(inner.market.epochs());
        inner.accounts.insert(player_key, account);
        Ok(())
    }

    /// Opens every account or none of them. A key repeated in `player_keys` or already held by the
    /// exchange rejects the whole batch.
    pub fn add_player_accounts(&self, player_keys: Vec<PlayerKey>) -> Result<(), ExchangeError> {
        let mut inner = self.lock()?;
        let mut seen = BTreeSet::new();
        for player_key in &player_keys {
            if inner.accounts.contains_key(player_key) || !seen.insert(player_key) {
                return Err(ExchangeError::DuplicateAccount {
                    player_key: player_key.clone(),
                });
            }
        }

        let epochs = inner.market.epochs();
        for player_key in player_keys {
            inner.accounts.insert(player_key, Account::new(epochs));
        }
        Ok(())
    }

    /// Records `position` as the player's order for the next epoch, replacing any order already
    /// pending for that epoch.
    pub fn trade(&self, player_key: &str, position: i64) -> Result<TradeReceipt, ExchangeError> {
        let mut inner = self.lock()?;
        let epoch = inner.market.epoch();
        if inner.market.is_exhausted() {
            return Err(ExchangeError::MarketClosed { epoch });
        }

        let account =
            inner
                .accounts
                .get_mut(player_key)
                .ok_or_else(|| ExchangeError::UnknownPlayer {
                    player_key: player_key.to_string(),
                })?;

        let leverage = account.leverage();
        let next = leverage
            .checked_add(position)
            .ok_or(ExchangeError::LeverageOverflow { leverage, position })?;
        if let Some(cap) = self.leverage_cap {
            if next.unsigned_abs() > cap.unsigned_abs() {
                return Err(ExchangeError::ExposureLimit {
                    leverage,
                    position,
                    cap,
                });
            }
        }

        account.set_position(epoch + 1, position);
        account.set_leverage(next);
        debug!("{player_key} traded {position} for epoch {}", epoch + 1);
        Ok(TradeReceipt {
            epoch,
            leverage: next,
        })
    }

    pub fn update_market(&self) -> Result<Step, ExchangeError> {
        let mut inner = self.lock()?;
        let ExchangeInner {
            accounts,
            market,
            sum_log_return,
        } = &mut *inner;

        let step = market.update_state(accounts)?;
        *sum_log_return += step.log_return;
        info!(
            "epoch {}/{} log return {:.6}",
            step.epoch,
            market.epochs(),
            step.log_return
        );
        Ok(step)
    }

    pub fn get_latest_price(&self) -> Result<LatestPrice, ExchangeError> {
        let inner = self.lock()?;
        Ok(LatestPrice {
            epoch: inner.market.epoch(),
            price: self.start_price * inner.sum_log_return.exp(),
        })
    }

    pub fn snapshot(&self) -> Result<ExchangeSnapshot, ExchangeError> {
        let inner = self.lock()?;
        Ok(ExchangeSnapshot {
            simulator: inner.market.name().to_string(),
            epoch: inner.market.epoch(),
            epochs: inner.market.epochs(),
            start_price: self.start_price,
            sum_log_return: inner.sum_log_return,
            ledger: inner.market.ledger().clone(),
            accounts: inner.accounts.clone(),
        })
    }
}
