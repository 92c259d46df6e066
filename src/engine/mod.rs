//! Drives an exchange through a game in real time.
//!
//! The engine owns at most one background task. The task sleeps until the next
//! [Cadence](crate::clock::Cadence) boundary, advances the market by one epoch and repeats until
//! every epoch has run or [GameEngine::stop] is called. Stopping is cooperative: the flag is sent
//! over a watch channel which also interrupts the sleep, but an update that is already in progress
//! completes first.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use derive_more::{Display, Error};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Cadence;
use crate::exchange::{Exchange, ExchangeError, PlayerKey};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Waiting,
    Running,
    Done,
    Stopped,
}

impl EngineStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, EngineStatus::Done | EngineStatus::Stopped)
    }
}

#[derive(Debug, Display, Error)]
pub enum EngineError {
    Exchange(ExchangeError),
    #[display("game engine must be started from within a tokio runtime")]
    NoRuntime,
}

impl From<ExchangeError> for EngineError {
    fn from(value: ExchangeError) -> Self {
        EngineError::Exchange(value)
    }
}

type SharedStatus = Arc<Mutex<EngineStatus>>;

// Status is a plain Copy value so a poisoned lock still holds a coherent state.
fn read(status: &SharedStatus) -> EngineStatus {
    *status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves a running engine to `to`. Anything other than `Running` is left alone so a stop is never
/// overwritten by the loop finishing.
fn finish(status: &SharedStatus, to: EngineStatus) {
    let mut current = status.lock().unwrap_or_else(PoisonError::into_inner);
    if *current == EngineStatus::Running {
        *current = to;
    }
}

#[derive(Debug)]
pub struct GameEngine {
    exchange: Arc<Exchange>,
    cadence: Cadence,
    status: SharedStatus,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameEngine {
    pub fn new(exchange: Arc<Exchange>, timestep: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            exchange,
            cadence: Cadence::new(timestep),
            status: Arc::new(Mutex::new(EngineStatus::Waiting)),
            stop,
            task: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> Arc<Exchange> {
        Arc::clone(&self.exchange)
    }

    pub fn status(&self) -> EngineStatus {
        read(&self.status)
    }

    /// Opens an account for every player and spawns the driving task. Returns `false` without
    /// doing anything when the engine has already been started. Accounts are opened all at once,
    /// so a rejected key list leaves the exchange empty and the engine can be started again.
    pub fn start<I, K>(&self, player_keys: I) -> Result<bool, EngineError>
    where
        I: IntoIterator<Item = K>,
        K: Into<PlayerKey>,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != EngineStatus::Waiting {
            warn!("start ignored, engine is {:?}", *status);
            return Ok(false);
        }

        let player_keys: Vec<PlayerKey> = player_keys.into_iter().map(Into::into).collect();
        self.exchange.add_player_accounts(player_keys)?;
        let (_, epochs) = self.exchange.clock()?;

        *status = EngineStatus::Running;
        drop(status);

        let handle = runtime.spawn(drive(
            Arc::clone(&self.exchange),
            self.cadence,
            epochs,
            Arc::clone(&self.status),
            self.stop.subscribe(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(
            "engine started for {epochs} epochs every {:?}",
            self.cadence.timestep()
        );
        Ok(true)
    }

    pub fn stop(&self) -> EngineStatus {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == EngineStatus::Running {
            *status = EngineStatus::Stopped;
            self.stop.send_replace(true);
            info!("engine stop requested");
        }
        *status
    }

    /// Waits for the driving task to exit. Returns immediately if it was never started.
    pub async fn wait(&self) -> EngineStatus {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("engine task ended abnormally: {e}");
                finish(&self.status, EngineStatus::Done);
            }
        }
        self.status()
    }
}

async fn drive(
    exchange: Arc<Exchange>,
    cadence: Cadence,
    epochs: usize,
    status: SharedStatus,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        match exchange.clock() {
            Ok((epoch, _)) if epoch >= epochs => {
                finish(&status, EngineStatus::Done);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("engine could not read market clock: {e}");
                finish(&status, EngineStatus::Done);
                break;
            }
        }

        let wait = cadence.until_next(OffsetDateTime::now_utc());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = stop.changed() => {
                // Sender dropped along with the engine
                if changed.is_err() {
                    break;
                }
            }
        }

        if *stop.borrow() {
            break;
        }

        if let Err(e) = exchange.update_market() {
            error!("market update failed, ending game: {e}");
            finish(&status, EngineStatus::Done);
            break;
        }
    }
    info!("engine loop exited with status {:?}", read(&status));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{EngineError, EngineStatus, GameEngine};
    use crate::exchange::{Exchange, ExchangeBuilder, ExchangeError};
    use crate::market::gaussian::Gaussian;
    use crate::market::MarketParams;

    fn exchange(epochs: usize) -> Arc<Exchange> {
        let params = MarketParams {
            epochs,
            seed: Some(1),
            ..MarketParams::default()
        };
        Arc::new(
            ExchangeBuilder::new()
                .with_market(Gaussian::boxed(&params).unwrap())
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_that_engine_runs_every_epoch_then_finishes() {
        let engine = GameEngine::new(exchange(5), Duration::from_millis(10));
        assert_eq!(engine.status(), EngineStatus::Waiting);

        assert!(engine.start(["abc", "bcd"]).unwrap());
        assert_eq!(engine.status(), EngineStatus::Running);

        let status = tokio::time::timeout(Duration::from_secs(5), engine.wait())
            .await
            .unwrap();
        assert_eq!(status, EngineStatus::Done);
        assert_eq!(engine.exchange().clock().unwrap(), (5, 5));
        assert!(engine.exchange().has_player("abc").unwrap());
    }

    #[tokio::test]
    async fn test_that_stop_interrupts_the_loop() {
        let engine = GameEngine::new(exchange(1000), Duration::from_millis(50));
        engine.start(["abc"]).unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(engine.stop(), EngineStatus::Stopped);

        let status = tokio::time::timeout(Duration::from_secs(1), engine.wait())
            .await
            .unwrap();
        assert_eq!(status, EngineStatus::Stopped);

        // Ticks wait for the next 50ms boundary, so at most three fit before the stop
        let (epoch, _) = engine.exchange().clock().unwrap();
        assert!(epoch <= 3);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(engine.exchange().clock().unwrap(), (epoch, 1000));
    }

    #[tokio::test]
    async fn test_that_engine_cannot_be_restarted() {
        let engine = GameEngine::new(exchange(2), Duration::from_millis(5));
        assert!(engine.start(["abc"]).unwrap());
        assert!(!engine.start(["bcd"]).unwrap());

        engine.wait().await;
        assert_eq!(engine.status(), EngineStatus::Done);
        assert!(!engine.start(["bcd"]).unwrap());
        assert_eq!(engine.stop(), EngineStatus::Done);
        assert!(!engine.exchange().has_player("bcd").unwrap());
    }

    #[tokio::test]
    async fn test_that_duplicate_players_leave_engine_waiting() {
        let engine = GameEngine::new(exchange(2), Duration::from_millis(5));
        let res = engine.start(["abc", "abc"]);
        assert!(matches!(
            res,
            Err(EngineError::Exchange(ExchangeError::DuplicateAccount { .. }))
        ));
        assert_eq!(engine.status(), EngineStatus::Waiting);
        assert!(engine.exchange().snapshot().unwrap().accounts.is_empty());

        let res = engine.start(["abc", "bcd", "cde", "bcd"]);
        assert!(res.is_err());
        assert!(!engine.exchange().has_player("abc").unwrap());

        assert!(engine.start(["abc", "bcd"]).unwrap());
        assert_eq!(engine.status(), EngineStatus::Running);
        assert!(engine.exchange().has_player("bcd").unwrap());
        engine.wait().await;
    }

    #[tokio::test]
    async fn test_that_exhausted_market_finishes_without_panicking() {
        let exchange = exchange(2);
        exchange.update_market().unwrap();
        exchange.update_market().unwrap();

        let engine = GameEngine::new(exchange, Duration::from_millis(5));
        engine.start(Vec::<String>::new()).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(1), engine.wait())
            .await
            .unwrap();
        assert_eq!(status, EngineStatus::Done);
    }

    #[test]
    fn test_that_start_requires_a_runtime() {
        let engine = GameEngine::new(exchange(2), Duration::from_millis(5));
        assert!(matches!(engine.start(["abc"]), Err(EngineError::NoRuntime)));
        assert_eq!(engine.status(), EngineStatus::Waiting);
    }
}
