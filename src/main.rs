// src/main.rs

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use casechat::config::CONFIG;
use casechat::{db, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; CONFIG loads .env on first access
    let level: Level = CONFIG.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting casechat orchestration core");
    info!("Inference model: {}", CONFIG.inference_model);
    info!(
        "Sweeper: every {}s, abandon after {} minutes",
        CONFIG.sweep_interval_secs, CONFIG.abandon_after_minutes
    );

    // Create database pool; connect() bootstraps the schema
    let pool = db::connect(&CONFIG.database_url, CONFIG.sqlite_max_connections).await?;

    let state = AppState::build(pool, &CONFIG);

    // Start abandonment sweeper as a background task
    let sweeper_handle = state.sweeper.clone().spawn();
    info!("Abandonment sweeper started");

    let bind_address = CONFIG.bind_address();
    tokio::select! {
        result = server::run(state, &bind_address) => {
            if let Err(e) = result {
                tracing::error!("server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    sweeper_handle.abort();
    Ok(())
}
