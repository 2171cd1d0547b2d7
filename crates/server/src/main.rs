use helpdesk_server::{app, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, dev_mode = config.dev_mode, "Starting helpdesk server");

    let state = AppState::from_config(&config).await?;
    match state.knowledge.ensure_index().await {
        Ok(true) => info!("Created vector index"),
        Ok(false) => {}
        Err(e) => tracing::warn!("Vector index not ready: {}", e),
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "Helpdesk server listening");
    axum::serve(listener, app(state)).await?;

    Ok(())
}
