#![cfg(not(tarpaulin_include))]

use env_logger::Env;
use sheetgate::{Config, app};

/// Main entry point for the web application
///
/// Reads `SHEETGATE_*` settings from the environment and serves until
/// Ctrl+C or SIGTERM. Log verbosity follows `RUST_LOG` (default `info`).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
