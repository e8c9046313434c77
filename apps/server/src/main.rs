#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::num::NonZeroUsize;

use actix_web::HttpServer;
use sentinel_service::{Config, ConfigError, Monitoring};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod app;
mod error;
mod routes;
mod state;

use error::AppError;
use logger::init_tracing;
use state::AppState;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mut config = Config::from_config(std::env::var_os("SENTINEL_CONFIG"))?;
    config.apply_env(std::env::vars())?;
    config.validate()?;
    info!("{}", config);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let history_limit = NonZeroUsize::new(config.server.history_limit).ok_or_else(|| ConfigError::InvalidValue {
        key: "server.history_limit".into(),
        value: "0".into(),
    })?;

    let cancel = CancellationToken::new();
    let monitoring = Monitoring::start(&config, cancel.clone()).await?;

    let state = AppState {
        store: monitoring.store.clone(),
        status: monitoring.status.clone(),
        target_count: monitoring.target_count,
        history_limit,
    };

    let served = run_server(addr, state).await;

    info!("HTTP server stopped, waiting for the monitor loop");
    monitoring.shutdown().await;

    served
}

async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), AppError> {
    info!(%addr, "Serving probe log");

    HttpServer::new(move || app::create_app(state.clone()))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
