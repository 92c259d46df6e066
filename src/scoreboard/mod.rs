//! End-of-game reporting, derived entirely from an [ExchangeSnapshot].
//!
//! A player's holding at an epoch is the running sum of every order they submitted up to and
//! including that epoch, so epochs where they abstained simply carry the previous holding
//! forward. The order for epoch `e` moves the market into `e`, which means a player is exposed to
//! the return realized at the same epoch they traded for.
use serde::{Deserialize, Serialize};

use crate::exchange::{Account, ExchangeSnapshot, PlayerKey};
use crate::market::Epoch;

pub fn holdings(account: &Account, epoch: Epoch) -> Vec<i64> {
    account
        .positions()
        .iter()
        .take(epoch + 1)
        .scan(0_i64, |holding, position| {
            // Only the last order per epoch is held, so the leverage cap does not bound this sum
            *holding = holding.saturating_add(position.unwrap_or(0));
            Some(*holding)
        })
        .collect()
}

pub fn portfolio_values(start_price: f64, holdings: &[i64], log_returns: &[f64]) -> Vec<f64> {
    holdings
        .iter()
        .zip(log_returns)
        .scan(0.0, |cumulative, (holding, log_return)| {
            *cumulative += *holding as f64 * log_return;
            Some(start_price * cumulative.exp())
        })
        .collect()
}

pub fn market_prices(start_price: f64, log_returns: &[f64]) -> Vec<f64> {
    log_returns
        .iter()
        .scan(0.0, |cumulative, log_return| {
            *cumulative += log_return;
            Some(start_price * cumulative.exp())
        })
        .collect()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Score {
    pub rank: usize,
    /// Account key of the player. The lobby swaps this for the display name before publishing,
    /// as player keys double as trading credentials.
    pub player: PlayerKey,
    pub holding: i64,
    pub value: f64,
    pub holdings: Vec<i64>,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Scoreboard {
    pub epoch: Epoch,
    pub prices: Vec<f64>,
    pub scores: Vec<Score>,
}

impl Scoreboard {
    pub fn from_snapshot(snapshot: &ExchangeSnapshot) -> Self {
        let log_returns = snapshot.log_returns();

        let mut scores: Vec<Score> = snapshot
            .accounts
            .iter()
            .map(|(player_key, account)| {
                let holdings = holdings(account, snapshot.epoch);
                let values = portfolio_values(snapshot.start_price, &holdings, log_returns);
                Score {
                    rank: 0,
                    player: player_key.clone(),
                    holding: holdings.last().copied().unwrap_or(0),
                    value: values.last().copied().unwrap_or(snapshot.start_price),
                    holdings,
                    values,
                }
            })
            .collect();

        scores.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then_with(|| a.player.cmp(&b.player))
        });
        for (pos, score) in scores.iter_mut().enumerate() {
            score.rank = pos + 1;
        }

        Self {
            epoch: snapshot.epoch,
            prices: market_prices(snapshot.start_price, log_returns),
            scores,
        }
    }

    pub fn leader(&self) -> Option<&Score> {
        self.scores.first()
    }

    pub fn get(&self, player: &str) -> Option<&Score> {
        self.scores.iter().find(|score| score.player == player)
    }
}

#[cfg(test)]
mod tests {
    use super::{holdings, Scoreboard};
    use crate::exchange::{Account, Accounts, ExchangeBuilder, ExchangeSnapshot};
    use crate::market::gaussian::Gaussian;
    use crate::market::{Ledger, MarketParams};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn snapshot() -> ExchangeSnapshot {
        let mut ledger = Ledger::new(3);
        ledger.log_return = vec![0.0, 0.1, -0.05, 0.02];

        let mut long = Account::new(3);
        long.set_position(1, 2);
        let mut short = Account::new(3);
        short.set_position(2, -1);

        let mut accounts = Accounts::new();
        accounts.insert("long".to_string(), long);
        accounts.insert("short".to_string(), short);
        accounts.insert("idle".to_string(), Account::new(3));

        ExchangeSnapshot {
            simulator: "gaussian".to_string(),
            epoch: 3,
            epochs: 3,
            start_price: 100.0,
            sum_log_return: 0.07,
            ledger,
            accounts,
        }
    }

    #[test]
    fn test_that_holdings_forward_fill_abstained_epochs() {
        let mut account = Account::new(5);
        account.set_position(1, 3);
        account.set_position(3, -1);
        account.set_position(4, 0);
        assert_eq!(holdings(&account, 5), vec![0, 3, 3, 2, 2, 2]);
        assert_eq!(holdings(&account, 2), vec![0, 3, 3]);
    }

    #[test]
    fn test_that_extreme_holdings_saturate() {
        let mut account = Account::new(3);
        account.set_position(1, -i64::MAX);
        account.set_position(2, -i64::MAX);
        account.set_position(3, 5);
        assert_eq!(holdings(&account, 3), vec![0, -i64::MAX, i64::MIN, i64::MIN + 5]);
    }

    #[test]
    fn test_that_scores_follow_exposure_to_returns() {
        let scoreboard = Scoreboard::from_snapshot(&snapshot());

        let long = scoreboard.get("long").unwrap();
        assert_eq!(long.holdings, vec![0, 2, 2, 2]);
        assert!(close(long.value, 100.0 * 0.14_f64.exp()));

        let short = scoreboard.get("short").unwrap();
        assert_eq!(short.holding, -1);
        assert!(close(short.value, 100.0 * 0.03_f64.exp()));

        let idle = scoreboard.get("idle").unwrap();
        assert!(idle.values.iter().all(|value| *value == 100.0));

        let ranking: Vec<&str> = scoreboard
            .scores
            .iter()
            .map(|score| score.player.as_str())
            .collect();
        assert_eq!(ranking, vec!["long", "short", "idle"]);
        assert_eq!(scoreboard.leader().unwrap().rank, 1);
        assert!(close(*scoreboard.prices.last().unwrap(), 100.0 * 0.07_f64.exp()));
    }

    #[test]
    fn test_that_scoreboard_matches_live_exchange() {
        let params = MarketParams {
            epochs: 4,
            seed: Some(5),
            ..MarketParams::default()
        };
        let exchange = ExchangeBuilder::new()
            .with_market(Gaussian::boxed(&params).unwrap())
            .build()
            .unwrap();
        exchange.add_player_account("abc").unwrap();
        exchange.add_player_account("bcd").unwrap();

        exchange.trade("abc", 1).unwrap();
        exchange.update_market().unwrap();
        exchange.trade("bcd", -2).unwrap();
        exchange.update_market().unwrap();
        exchange.update_market().unwrap();

        let snapshot = exchange.snapshot().unwrap();
        let scoreboard = Scoreboard::from_snapshot(&snapshot);
        assert_eq!(scoreboard.epoch, 3);
        assert_eq!(scoreboard.prices.len(), 4);

        let latest = exchange.get_latest_price().unwrap();
        assert!(close(*scoreboard.prices.last().unwrap(), latest.price));

        // A single unit long tracks the market price exactly from the epoch it was bought
        let abc = scoreboard.get("abc").unwrap();
        assert_eq!(abc.holdings, vec![0, 1, 1, 1]);
        assert!(close(abc.value, latest.price));
    }
}
