use anyhow::Result;
use tally_agent::{AgentConfig, Scheduler};
use tally_collector::alloc::CountingAllocator;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tally=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1).or_else(|| {
        let default = "config/agent.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    });

    let config = AgentConfig::from_sources(config_path.as_deref())?;
    tracing::info!(
        server = %config.base_url(),
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        workers = config.rate_limit,
        signed = config.signing_key().is_some(),
        "tally-agent starting"
    );

    let done = CancellationToken::new();
    let scheduler = tokio::spawn(Scheduler::new(&config)?.run(done.clone()));

    let shutdown = done.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down agent");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    scheduler.await??;
    Ok(())
}
