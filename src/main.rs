//! Duty Rota - Axum Server
//!
//! Run with: cargo run
//! Then call: http://localhost:7860/health

use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use duty_rota::config::AppConfig;
use duty_rota::demo_data::{self, DemoData};
use duty_rota::domain::RosterSnapshot;
use duty_rota::api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duty_rota=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let roster = match &config.snapshot_path {
        Some(path) => {
            info!(path = %path.display(), "Loading roster snapshot");
            RosterSnapshot::from_json_file(path)?
        }
        None => {
            info!("No snapshot configured, using SMALL demo roster");
            demo_data::generate(DemoData::Small)
        }
    };

    #[cfg(feature = "console")]
    {
        duty_rota::console::print_banner();
        duty_rota::console::print_config(&roster);
    }

    let addr = config.socket_addr()?;
    let state = Arc::new(api::AppState::new(config, roster)?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state).layer(cors);

    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
