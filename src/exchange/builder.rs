use std::sync::Mutex;

use super::{Accounts, Exchange, ExchangeInner};
use crate::market::gaussian::Gaussian;
use crate::market::{MarketError, MarketModel, MarketParams};

pub const DEFAULT_START_PRICE: f64 = 100.0;
pub const DEFAULT_LEVERAGE_CAP: i64 = 10;

pub struct ExchangeBuilder {
    market: Option<Box<dyn MarketModel>>,
    start_price: f64,
    leverage_cap: Option<i64>,
}

impl ExchangeBuilder {
    /// Falls back to a [Gaussian] market over `MarketParams::default()` when no market was given.
    pub fn build(&mut self) -> Result<Exchange, MarketError> {
        let market = match self.market.take() {
            Some(market) => market,
            None => Gaussian::boxed(&MarketParams::default())?,
        };

        if !(self.start_price.is_finite() && self.start_price > 0.0) {
            return Err(MarketError::InvalidParameter {
                name: "start_price",
                value: self.start_price,
            });
        }
        if let Some(cap) = self.leverage_cap.filter(|cap| *cap < 0) {
            return Err(MarketError::InvalidParameter {
                name: "leverage_cap",
                value: cap as f64,
            });
        }

        Ok(Exchange {
            start_price: self.start_price,
            leverage_cap: self.leverage_cap,
            inner: Mutex::new(ExchangeInner {
                accounts: Accounts::new(),
                market,
                sum_log_return: 0.0,
            }),
        })
    }

    pub fn with_market(&mut self, market: Box<dyn MarketModel>) -> &mut Self {
        self.market = Some(market);
        self
    }

    pub fn with_start_price(&mut self, start_price: f64) -> &mut Self {
        self.start_price = start_price;
        self
    }

    /// `None` removes the exposure limit entirely. Negative caps are rejected by `build`.
    pub fn with_leverage_cap(&mut self, leverage_cap: Option<i64>) -> &mut Self {
        self.leverage_cap = leverage_cap;
        self
    }

    pub fn new() -> Self {
        Self {
            market: None,
            start_price: DEFAULT_START_PRICE,
            leverage_cap: Some(DEFAULT_LEVERAGE_CAP),
        }
    }
}

impl Default for ExchangeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
