use tracing_subscriber::EnvFilter;

use tumor_scan::api;
use tumor_scan::config::Config;
use tumor_scan::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Upload directory: {}", config.upload_dir.display());
    tracing::info!(
        "Containers: {} / {}",
        config.store.models_container,
        config.store.predictions_container
    );

    let state = AppState::new(config.clone())?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
