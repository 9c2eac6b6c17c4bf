use anyhow::{Context, Result};
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::persistence::Persistence;
use tally_server::state::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tally=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1).or_else(|| {
        let default = "config/server.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    });
    let config = ServerConfig::from_sources(config_path.as_deref())?;

    let persistence = Persistence::from_config(&config)
        .await
        .with_context(|| format!("Failed to open storage {}", config.redacted_dsn()))?;
    tracing::info!(
        address = %config.address,
        persistence = %persistence.describe(),
        database = %config.redacted_dsn(),
        restore = config.restore,
        signed = config.signing_key().is_some(),
        "tally-server starting"
    );

    let address = config.address.clone();
    let restore = config.restore;
    let state = AppState::new(config, persistence);

    // Restored state must be in place before the listener accepts traffic.
    if restore {
        state
            .persistence
            .restore(&state.store)
            .await
            .context("Failed to restore metrics")?;
    }

    let shutdown = CancellationToken::new();
    let flusher = state
        .persistence
        .spawn_periodic(state.store.clone(), shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!(addr = %address, "HTTP server listening");

    axum::serve(listener, app::build_http_app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down gracefully");
        })
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    if let Some(handle) = flusher {
        handle.await.context("Snapshot task panicked")?;
    }
    Ok(())
}
