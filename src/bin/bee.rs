use std::sync::Arc;

use anyhow::Context;
use colony_os::bee::{Bee, DocExecutor, ExecutorRegistry};
use colony_os::config::BeeConfig;
use colony_os::rpc::{ForemanApi, HttpForemanClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BeeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    eprintln!("🐝 Colony Bee v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker: {} ({})", config.bee_id, config.role);
    eprintln!("   Skills: {}", config.capabilities.join(", "));
    eprintln!("   Foreman: {}", config.foreman_url);
    eprintln!(
        "   Poll every {}s, heartbeat every {}s\n",
        config.poll_interval.as_secs(),
        config.heartbeat_interval.as_secs()
    );

    let api: Arc<dyn ForemanApi> = Arc::new(
        HttpForemanClient::new(&config.foreman_url, config.rpc_timeout)
            .context("Failed to build foreman client")?,
    );

    // Executors for every role this binary can serve. The role from config
    // picks one at startup; an unknown role is a startup error.
    let registry = ExecutorRegistry::new().with(Arc::new(DocExecutor::new()));

    let bee = Bee::new(config, api, &registry).context("No executor for the configured role")?;
    let handles = bee
        .start()
        .await
        .context("Could not register with the foreman")?;
    handles.join().await;

    Ok(())
}
