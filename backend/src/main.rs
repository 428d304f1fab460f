use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use attendance_tracker_backend::config::Config;
use attendance_tracker_backend::rest::{self, AppState};
use attendance_tracker_backend::storage::json::JsonConnection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    info!("Opening attendance store at {}", config.data_dir.display());
    let connection = Arc::new(JsonConnection::new(&config.data_dir)?);
    let state = AppState::new(&connection);

    // CORS setup to allow the dashboard frontend to make requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let photos_dir = config.data_dir.join("photos");
    let app = Router::new()
        .nest("/api", rest::api_router())
        .nest_service("/photos", ServeDir::new(photos_dir))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
