//! TATTA — pooled four-team betting game server.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the account store from disk (or starts fresh), and serves the
//! API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use tatta::config::AppConfig;
use tatta::server;
use tatta::server::routes::AppState;
use tatta::store::Store;

const BANNER: &str = r#"
 _____  _  _____  _____  _
|_   _|/ \|_   _||_   _|/ \
  | | / _ \ | |    | | / _ \
  | |/ ___ \| |    | |/ ___ \
  |_/_/   \_\_|    |_/_/   \_\

  Four teams. One pool. Winners split it.
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        starting_balance = cfg.game.starting_balance,
        admins = cfg.game.admins.len(),
        "TATTA starting up"
    );

    let store = Store::open(cfg.game.data_file.as_deref())?;
    let state = Arc::new(AppState::new(store, cfg.game.clone()));

    server::run(state, cfg.server.port).await?;

    info!("TATTA shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tatta=info"));

    let json_logging = std::env::var("TATTA_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
