pub mod config;
pub mod controller;
pub mod curve;
pub mod input;

use crate::config::RemapSettings;
use crate::controller::handle::RemapHandle;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = RemapSettings::from_env();
    let handle =
        RemapHandle::spawn(settings).map_err(|e| eyre!("Failed to spawn remapper: {}", e))?;

    let termination = handle.termination();
    tokio::select! {
        _ = termination.cancelled() => {
            warn!("Safety chord detected, exiting");
        }
        _ = handle.source_finished() => {
            info!("Raw input source finished");
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Interrupted, exiting"),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        },
    }

    match handle.shutdown().await {
        Ok(stats) => info!(
            "Session finished: {} events delivered, {} consumed, {} lines skipped",
            stats.delivered, stats.consumed, stats.skipped
        ),
        Err(e) => error!("Session ended with error: {}", e),
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
