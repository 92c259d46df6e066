use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::market::Epoch;

pub type PlayerKey = String;

/// Ordered so that volume is always summed in the same order, which keeps seeded runs
/// reproducible.
pub type Accounts = BTreeMap<PlayerKey, Account>;

/// Orders a single player has submitted, one slot per epoch.
///
/// `None` means the player did not trade for that epoch, which keeps "abstained" distinct from an
/// explicit order of zero.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Account {
    positions: Vec<Option<i64>>,
    leverage: i64,
}

impl Account {
    pub fn new(epochs: Epoch) -> Self {
        Self {
            positions: vec![None; epochs + 1],
            leverage: 0,
        }
    }

    pub fn position(&self, epoch: Epoch) -> Option<i64> {
        self.positions.get(epoch).copied().flatten()
    }

    pub fn positions(&self) -> &[Option<i64>] {
        &self.positions
    }

    pub fn leverage(&self) -> i64 {
        self.leverage
    }

    /// Overwrites whatever was pending for `epoch`. Out of range epochs are ignored, the exchange
    /// checks bounds before calling.
    pub(crate) fn set_position(&mut self, epoch: Epoch, position: i64) {
        if let Some(slot) = self.positions.get_mut(epoch) {
            *slot = Some(position);
        }
    }

    /// The exchange computes the new total with overflow and exposure checks before calling.
    pub(crate) fn set_leverage(&mut self, leverage: i64) {
        self.leverage = leverage;
    }
}
