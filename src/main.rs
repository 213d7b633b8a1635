mod config;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::persistence::JsonFileStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let port = config.port;
    let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    tracing::info!(
        data_dir = %config.data_dir.display(),
        max_clients = config.room.max_clients,
        grace_secs = config.room.grace_period.as_secs(),
        "configuration loaded"
    );

    let state = state::AppState::new(config, store);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "scrumkit listening");
    axum::serve(listener, app).await.expect("server failed");
}
