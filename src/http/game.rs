pub mod game_client {

    use reqwest::Result;

    use super::game_server::{
        AdminRequest, GameRequest, GameStatusResponse, JoinGameRequest, JoinGameResponse,
        NewGameRequest, NewGameResponse, PlayerRequest, SimulatorsResponse, StatusChangeResponse,
        TradeRequest,
    };

    use crate::exchange::{LatestPrice, TradeReceipt};
    use crate::scoreboard::Scoreboard;
    use crate::session::GameSettings;

    pub struct Client {
        pub path: String,
        pub client: reqwest::Client,
    }

    impl Client {
        async fn post<Req, Resp>(&self, route: &str, req: &Req) -> Result<Resp>
        where
            Req: serde::Serialize,
            Resp: serde::de::DeserializeOwned,
        {
            self.client
                .post(self.path.clone() + route)
                .json(req)
                .send()
                .await?
                .error_for_status()?
                .json::<Resp>()
                .await
        }

        pub async fn new_game(
            &self,
            admin_key: &str,
            settings: GameSettings,
        ) -> Result<NewGameResponse> {
            let req = NewGameRequest {
                admin_key: admin_key.to_string(),
                settings,
            };
            self.post("/new_game", &req).await
        }

        pub async fn join_game(&self, game_key: &str, player_name: &str) -> Result<JoinGameResponse> {
            let req = JoinGameRequest {
                game_key: game_key.to_string(),
                player_name: player_name.to_string(),
            };
            self.post("/join_game", &req).await
        }

        pub async fn game_status(&self, game_key: &str) -> Result<GameStatusResponse> {
            let req = GameRequest {
                game_key: game_key.to_string(),
            };
            self.post("/game_status", &req).await
        }

        pub async fn start_game(
            &self,
            admin_key: &str,
            game_key: &str,
        ) -> Result<StatusChangeResponse> {
            let req = AdminRequest {
                admin_key: admin_key.to_string(),
                game_key: game_key.to_string(),
            };
            self.post("/start_game", &req).await
        }

        pub async fn stop_game(&self, admin_key: &str, game_key: &str) -> Result<StatusChangeResponse> {
            let req = AdminRequest {
                admin_key: admin_key.to_string(),
                game_key: game_key.to_string(),
            };
            self.post("/stop_game", &req).await
        }

        pub async fn trade(
            &self,
            game_key: &str,
            player_key: &str,
            position: i64,
        ) -> Result<TradeReceipt> {
            let req = TradeRequest {
                game_key: game_key.to_string(),
                player_key: player_key.to_string(),
                position,
            };
            self.post("/trade", &req).await
        }

        pub async fn fetch_latest_price(
            &self,
            game_key: &str,
            player_key: &str,
        ) -> Result<LatestPrice> {
            let req = PlayerRequest {
                game_key: game_key.to_string(),
                player_key: player_key.to_string(),
            };
            self.post("/fetch_latest_price", &req).await
        }

        pub async fn scoreboard(&self, game_key: &str) -> Result<Scoreboard> {
            let req = GameRequest {
                game_key: game_key.to_string(),
            };
            self.post("/scoreboard", &req).await
        }

        pub async fn simulators(&self) -> Result<SimulatorsResponse> {
            self.client
                .get(self.path.clone() + "/simulators")
                .send()
                .await?
                .error_for_status()?
                .json::<SimulatorsResponse>()
                .await
        }

        pub fn new(path: String) -> Self {
            Self {
                path,
                client: reqwest::Client::new(),
            }
        }
    }
}

pub mod game_server {
    use std::sync::{Mutex, MutexGuard};

    use actix_web::http::StatusCode;
    use actix_web::{get, post, web, ResponseError};
    use serde::{Deserialize, Serialize};

    use crate::engine::EngineError;
    use crate::exchange::{ExchangeError, LatestPrice, PlayerKey, TradeReceipt};
    use crate::scoreboard::Scoreboard;
    use crate::session::{GameKey, GameSettings, GameStatus, SessionError, Sessions};

    pub type SessionsState = Mutex<Sessions>;

    fn lock(app: &web::Data<SessionsState>) -> Result<MutexGuard<'_, Sessions>, SessionError> {
        app.lock().map_err(|_| SessionError::Poisoned)
    }

    impl ResponseError for SessionError {
        fn status_code(&self) -> StatusCode {
            match self {
                SessionError::Unauthorized => StatusCode::UNAUTHORIZED,
                SessionError::Poisoned
                | SessionError::Exchange(ExchangeError::Poisoned)
                | SessionError::Engine(EngineError::Exchange(ExchangeError::Poisoned))
                | SessionError::Engine(EngineError::NoRuntime) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            }
        }
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct NewGameRequest {
        pub admin_key: String,
        #[serde(default)]
        pub settings: GameSettings,
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct NewGameResponse {
        pub game_key: GameKey,
    }

    #[post("/new_game")]
    pub async fn new_game(
        app: web::Data<SessionsState>,
        new_game: web::Json<NewGameRequest>,
    ) -> Result<web::Json<NewGameResponse>, SessionError> {
        let NewGameRequest {
            admin_key,
            settings,
        } = new_game.into_inner();
        let game_key = lock(&app)?.create_game(&admin_key, settings)?;
        Ok(web::Json(NewGameResponse { game_key }))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct JoinGameRequest {
        pub game_key: GameKey,
        pub player_name: String,
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct JoinGameResponse {
        pub player_key: PlayerKey,
    }

    #[post("/join_game")]
    pub async fn join_game(
        app: web::Data<SessionsState>,
        join_game: web::Json<JoinGameRequest>,
    ) -> Result<web::Json<JoinGameResponse>, SessionError> {
        let player_key = lock(&app)?.join_game(&join_game.game_key, &join_game.player_name)?;
        Ok(web::Json(JoinGameResponse { player_key }))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct GameRequest {
        pub game_key: GameKey,
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct GameStatusResponse {
        pub status: GameStatus,
        pub players: Vec<String>,
        pub settings: GameSettings,
    }

    #[post("/game_status")]
    pub async fn game_status(
        app: web::Data<SessionsState>,
        game: web::Json<GameRequest>,
    ) -> Result<web::Json<GameStatusResponse>, SessionError> {
        let sessions = lock(&app)?;
        Ok(web::Json(GameStatusResponse {
            status: sessions.status(&game.game_key)?,
            players: sessions.players(&game.game_key)?,
            settings: sessions.settings(&game.game_key)?.clone(),
        }))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct AdminRequest {
        pub admin_key: String,
        pub game_key: GameKey,
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct StatusChangeResponse {
        pub status: GameStatus,
    }

    #[post("/start_game")]
    pub async fn start_game(
        app: web::Data<SessionsState>,
        admin: web::Json<AdminRequest>,
    ) -> Result<web::Json<StatusChangeResponse>, SessionError> {
        let status = lock(&app)?.start_game(&admin.admin_key, &admin.game_key)?;
        Ok(web::Json(StatusChangeResponse { status }))
    }

    #[post("/stop_game")]
    pub async fn stop_game(
        app: web::Data<SessionsState>,
        admin: web::Json<AdminRequest>,
    ) -> Result<web::Json<StatusChangeResponse>, SessionError> {
        let status = lock(&app)?.stop_game(&admin.admin_key, &admin.game_key)?;
        Ok(web::Json(StatusChangeResponse { status }))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct TradeRequest {
        pub game_key: GameKey,
        pub player_key: PlayerKey,
        pub position: i64,
    }

    #[post("/trade")]
    pub async fn trade(
        app: web::Data<SessionsState>,
        trade: web::Json<TradeRequest>,
    ) -> Result<web::Json<TradeReceipt>, SessionError> {
        // Registry lock is released before the order reaches the exchange
        let exchange = lock(&app)?.exchange(&trade.game_key, &trade.player_key)?;
        let receipt = exchange.trade(&trade.player_key, trade.position)?;
        Ok(web::Json(receipt))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct PlayerRequest {
        pub game_key: GameKey,
        pub player_key: PlayerKey,
    }

    #[post("/fetch_latest_price")]
    pub async fn fetch_latest_price(
        app: web::Data<SessionsState>,
        player: web::Json<PlayerRequest>,
    ) -> Result<web::Json<LatestPrice>, SessionError> {
        let exchange = lock(&app)?.exchange(&player.game_key, &player.player_key)?;
        Ok(web::Json(exchange.get_latest_price()?))
    }

    #[post("/scoreboard")]
    pub async fn scoreboard(
        app: web::Data<SessionsState>,
        game: web::Json<GameRequest>,
    ) -> Result<web::Json<Scoreboard>, SessionError> {
        let scoreboard = lock(&app)?.scoreboard(&game.game_key)?;
        Ok(web::Json(scoreboard))
    }

    #[derive(Debug, Deserialize, Serialize)]
    pub struct SimulatorsResponse {
        pub simulators: Vec<String>,
    }

    #[get("/simulators")]
    pub async fn simulators(
        app: web::Data<SessionsState>,
    ) -> Result<web::Json<SimulatorsResponse>, SessionError> {
        Ok(web::Json(SimulatorsResponse {
            simulators: lock(&app)?.simulators(),
        }))
    }

    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.service(new_game)
            .service(join_game)
            .service(game_status)
            .service(start_game)
            .service(stop_game)
            .service(trade)
            .service(fetch_latest_price)
            .service(scoreboard)
            .service(simulators);
    }
}
