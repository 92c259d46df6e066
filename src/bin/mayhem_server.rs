use std::sync::Mutex;

use actix_web::{web, App, HttpServer};
use log::info;
use mayhem::config::ServerConfig;
use mayhem::http::game::game_server::configure;
use mayhem::market::catalog::SimulatorCatalog;
use mayhem::session::Sessions;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ServerConfig::from_env()?;
    let catalog = SimulatorCatalog::builtin();
    info!("simulators available: {}", catalog.names().join(", "));

    let sessions = web::Data::new(Mutex::new(Sessions::new(
        config.admin_key.clone(),
        catalog,
    )));

    info!("listening on {}:{}", config.address, config.port);
    HttpServer::new(move || App::new().app_data(sessions.clone()).configure(configure))
        .bind((config.address.clone(), config.port))?
        .run()
        .await?;
    Ok(())
}
