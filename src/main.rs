use std::sync::Arc;

use colony_os::config::ForemanConfig;
use colony_os::foreman::{Foreman, spawn_reaper_loop};
use colony_os::rpc::http::colony_routes;
use colony_os::store::{LibSqlStore, TaskStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ForemanConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    eprintln!("👷 Colony Foreman v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/v1", config.bind_addr);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Leases: {}s, {} retries, reaper every {}s\n",
        config.lease_ttl.as_secs(),
        config.max_retries,
        config.reaper_interval.as_secs()
    );

    let store: Arc<dyn TaskStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    let foreman = Arc::new(Foreman::new(Arc::clone(&store), config.clone()));

    // The first sweep fires immediately, recovering leases left behind by
    // a previous process.
    let _reaper_handle = spawn_reaper_loop(foreman.store(), config.reaper_interval);

    let app = colony_routes(Arc::clone(&foreman));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Foreman listening");
    axum::serve(listener, app).await?;

    Ok(())
}
