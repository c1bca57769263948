//! Huddle chat server.
//!
//! Configured from the environment (see [`huddle::Config`]); log level
//! from `RUST_LOG`, default `info`. Ctrl-C closes every connection and
//! exits.

use huddle::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        environment = %config.environment,
        addr = %config.bind_addr(),
        probe_interval_secs = config.liveness.probe_interval.as_secs(),
        "starting Huddle"
    );

    let server = HuddleServerBuilder::from_config(&config).build().await?;
    server.run_until(shutdown_signal()).await?;

    tracing::info!("Huddle stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl-C"),
        Err(e) => {
            // Without a signal handler the server runs until killed.
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
