//! In-memory lobby: games are created by the admin, joined by players while in the lobby and
//! then handed to a [GameEngine] which owns them until they finish.
//!
//! [Sessions] is a plain registry with no interior locking. The HTTP layer keeps it behind a
//! mutex, and trading goes through [Sessions::exchange] which hands back the game's
//! [Exchange] so orders never wait on the registry.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Display, Error};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, EngineStatus, GameEngine};
use crate::exchange::{
    Exchange, ExchangeBuilder, ExchangeError, PlayerKey, DEFAULT_LEVERAGE_CAP, DEFAULT_START_PRICE,
};
use crate::market::catalog::SimulatorCatalog;
use crate::market::gaussian::Gaussian;
use crate::market::{MarketError, MarketParams};
use crate::scoreboard::Scoreboard;

pub type GameKey = String;

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 20;

#[derive(Debug, Display, Error)]
pub enum SessionError {
    #[display("unauthorized")]
    Unauthorized,
    #[display("game {game_key} not found")]
    UnknownGame { game_key: GameKey },
    #[display("player {player_key} not found in game {game_key}")]
    UnknownPlayer {
        game_key: GameKey,
        player_key: PlayerKey,
    },
    #[display("game {game_key} has started and the lobby is closed")]
    LobbyClosed { game_key: GameKey },
    #[display("game {game_key} has not started")]
    NotStarted { game_key: GameKey },
    #[display("player name {player_name} must be 3 to 20 alphanumeric characters")]
    InvalidPlayerName { player_name: String },
    #[display("player {player_name} already exists")]
    DuplicatePlayer { player_name: String },
    Market(MarketError),
    Exchange(ExchangeError),
    Engine(EngineError),
    #[display("session registry poisoned by an earlier panic")]
    Poisoned,
}

impl From<MarketError> for SessionError {
    fn from(value: MarketError) -> Self {
        SessionError::Market(value)
    }
}

impl From<ExchangeError> for SessionError {
    fn from(value: ExchangeError) -> Self {
        SessionError::Exchange(value)
    }
}

impl From<EngineError> for SessionError {
    fn from(value: EngineError) -> Self {
        SessionError::Engine(value)
    }
}

/// Everything the admin chooses when creating a game. Missing fields take their defaults when
/// deserialized.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GameSettings {
    pub simulator: String,
    pub epochs: usize,
    pub timestep_secs: u64,
    pub volatility: f64,
    pub decay: f64,
    pub hurst: f64,
    pub start_price: f64,
    pub leverage_cap: Option<i64>,
    pub seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        let params = MarketParams::default();
        Self {
            simulator: Gaussian::NAME.to_string(),
            epochs: params.epochs,
            timestep_secs: 1,
            volatility: params.volatility,
            decay: params.decay,
            hurst: params.hurst,
            start_price: DEFAULT_START_PRICE,
            leverage_cap: Some(DEFAULT_LEVERAGE_CAP),
            seed: params.seed,
        }
    }
}

impl GameSettings {
    pub fn market_params(&self) -> MarketParams {
        MarketParams {
            epochs: self.epochs,
            volatility: self.volatility,
            decay: self.decay,
            hurst: self.hurst,
            seed: self.seed,
        }
    }

    pub fn timestep(&self) -> Duration {
        Duration::from_secs(self.timestep_secs)
    }

    pub fn validate(&self, catalog: &SimulatorCatalog) -> Result<(), MarketError> {
        if !catalog.contains(&self.simulator) {
            return Err(MarketError::UnknownSimulator {
                name: self.simulator.clone(),
            });
        }
        if self.timestep_secs == 0 {
            return Err(MarketError::InvalidParameter {
                name: "timestep_secs",
                value: 0.0,
            });
        }
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
        self.market_params().validate()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Lobby,
    Running,
    Done,
    Stopped,
}

impl From<EngineStatus> for GameStatus {
    fn from(value: EngineStatus) -> Self {
        match value {
            EngineStatus::Waiting => GameStatus::Lobby,
            EngineStatus::Running => GameStatus::Running,
            EngineStatus::Done => GameStatus::Done,
            EngineStatus::Stopped => GameStatus::Stopped,
        }
    }
}

#[derive(Debug)]
struct Player {
    name: String,
    key: PlayerKey,
}

#[derive(Debug)]
struct Game {
    settings: GameSettings,
    players: Vec<Player>,
    engine: Option<GameEngine>,
}

impl Game {
    fn status(&self) -> GameStatus {
        match &self.engine {
            Some(engine) => engine.status().into(),
            None => GameStatus::Lobby,
        }
    }

    fn name_of(&self, player_key: &str) -> Option<&str> {
        self.players
            .iter()
            .find(|player| player.key == player_key)
            .map(|player| player.name.as_str())
    }
}

fn valid_player_name(name: &str) -> bool {
    (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn new_key<F>(taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut rng = rand::thread_rng();
    loop {
        let key = format!("{:08x}", rng.gen::<u32>());
        if !taken(&key) {
            return key;
        }
    }
}

#[derive(Debug)]
pub struct Sessions {
    admin_key: String,
    catalog: SimulatorCatalog,
    games: HashMap<GameKey, Game>,
}

impl Sessions {
    pub fn new(admin_key: impl Into<String>, catalog: SimulatorCatalog) -> Self {
        Self {
            admin_key: admin_key.into(),
            catalog,
            games: HashMap::new(),
        }
    }

    fn authorize(&self, admin_key: &str) -> Result<(), SessionError> {
        if admin_key != self.admin_key {
            warn!("rejected request with bad admin key");
            return Err(SessionError::Unauthorized);
        }
        Ok(())
    }

    fn game(&self, game_key: &str) -> Result<&Game, SessionError> {
        self.games
            .get(game_key)
            .ok_or_else(|| SessionError::UnknownGame {
                game_key: game_key.to_string(),
            })
    }

    fn game_mut(&mut self, game_key: &str) -> Result<&mut Game, SessionError> {
        self.games
            .get_mut(game_key)
            .ok_or_else(|| SessionError::UnknownGame {
                game_key: game_key.to_string(),
            })
    }

    fn engine<'a>(game: &'a Game, game_key: &str) -> Result<&'a GameEngine, SessionError> {
        game.engine.as_ref().ok_or_else(|| SessionError::NotStarted {
            game_key: game_key.to_string(),
        })
    }

    pub fn simulators(&self) -> Vec<String> {
        self.catalog.names()
    }

    pub fn create_game(
        &mut self,
        admin_key: &str,
        settings: GameSettings,
    ) -> Result<GameKey, SessionError> {
        self.authorize(admin_key)?;
        settings.validate(&self.catalog)?;

        let game_key = new_key(|key| self.games.contains_key(key));
        info!(
            "created game {game_key}: {} for {} epochs",
            settings.simulator, settings.epochs
        );
        self.games.insert(
            game_key.clone(),
            Game {
                settings,
                players: Vec::new(),
                engine: None,
            },
        );
        Ok(game_key)
    }

    pub fn join_game(
        &mut self,
        game_key: &str,
        player_name: &str,
    ) -> Result<PlayerKey, SessionError> {
        if !valid_player_name(player_name) {
            return Err(SessionError::InvalidPlayerName {
                player_name: player_name.to_string(),
            });
        }

        let game = self.game_mut(game_key)?;
        if game.status() != GameStatus::Lobby {
            return Err(SessionError::LobbyClosed {
                game_key: game_key.to_string(),
            });
        }
        if game.players.iter().any(|player| player.name == player_name) {
            return Err(SessionError::DuplicatePlayer {
                player_name: player_name.to_string(),
            });
        }

        let key = new_key(|key| game.players.iter().any(|player| player.key == key));
        game.players.push(Player {
            name: player_name.to_string(),
            key: key.clone(),
        });
        info!("{player_name} joined game {game_key}");
        Ok(key)
    }

    /// Closes the lobby and starts the game with every player that joined. Must be called from
    /// within a tokio runtime.
    pub fn start_game(&mut self, admin_key: &str, game_key: &str) -> Result<GameStatus, SessionError> {
        self.authorize(admin_key)?;

        let catalog = &self.catalog;
        let game = self
            .games
            .get_mut(game_key)
            .ok_or_else(|| SessionError::UnknownGame {
                game_key: game_key.to_string(),
            })?;
        if game.engine.is_some() {
            return Err(SessionError::LobbyClosed {
                game_key: game_key.to_string(),
            });
        }

        let settings = &game.settings;
        let market = catalog.build(&settings.simulator, &settings.market_params())?;
        let exchange = ExchangeBuilder::new()
            .with_market(market)
            .with_start_price(settings.start_price)
            .with_leverage_cap(settings.leverage_cap)
            .build()?;

        let engine = GameEngine::new(Arc::new(exchange), settings.timestep());
        engine.start(game.players.iter().map(|player| player.key.clone()))?;
        info!(
            "started game {game_key} with {} players",
            game.players.len()
        );

        let status: GameStatus = engine.status().into();
        game.engine = Some(engine);
        Ok(status)
    }

    pub fn stop_game(&mut self, admin_key: &str, game_key: &str) -> Result<GameStatus, SessionError> {
        self.authorize(admin_key)?;
        let game = self.game(game_key)?;
        let status = Self::engine(game, game_key)?.stop();
        info!("stop requested for game {game_key}, now {status:?}");
        Ok(status.into())
    }

    pub fn status(&self, game_key: &str) -> Result<GameStatus, SessionError> {
        Ok(self.game(game_key)?.status())
    }

    pub fn players(&self, game_key: &str) -> Result<Vec<String>, SessionError> {
        Ok(self
            .game(game_key)?
            .players
            .iter()
            .map(|player| player.name.clone())
            .collect())
    }

    pub fn settings(&self, game_key: &str) -> Result<&GameSettings, SessionError> {
        Ok(&self.game(game_key)?.settings)
    }

    /// Resolves the exchange a player trades on. Fails for players that are not part of the
    /// game and for games still in the lobby.
    pub fn exchange(&self, game_key: &str, player_key: &str) -> Result<Arc<Exchange>, SessionError> {
        let game = self.game(game_key)?;
        if game.name_of(player_key).is_none() {
            return Err(SessionError::UnknownPlayer {
                game_key: game_key.to_string(),
                player_key: player_key.to_string(),
            });
        }
        Ok(Self::engine(game, game_key)?.exchange())
    }

    /// Current standings with player keys replaced by player names.
    pub fn scoreboard(&self, game_key: &str) -> Result<Scoreboard, SessionError> {
        let game = self.game(game_key)?;
        let snapshot = Self::engine(game, game_key)?.exchange().snapshot()?;

        let mut scoreboard = Scoreboard::from_snapshot(&snapshot);
        for score in scoreboard.scores.iter_mut() {
            if let Some(name) = game.name_of(&score.player) {
                score.player = name.to_string();
            }
        }
        Ok(scoreboard)
    }
}
