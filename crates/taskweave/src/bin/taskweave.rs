//! Runs the scheduler, job workers and ingestion loop until Ctrl-C.
//!
//! Usage: `taskweave [CONFIG_JSON]`. Without an argument the config is read
//! from `<config dir>/taskweave/config.json` when present, else defaults apply.

use std::path::PathBuf;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use taskweave::telemetry::init_tracing;
use taskweave::{load_config, Config, TaskWeave};

fn config_path() -> Option<PathBuf> {
    if let Some(arg) = std::env::args_os().nth(1) {
        return Some(PathBuf::from(arg));
    }
    dirs::config_dir()
        .map(|dir| dir.join("taskweave").join("config.json"))
        .filter(|path| path.exists())
}

#[tokio::main]
async fn main() -> taskweave::Result<()> {
    let config = match config_path() {
        Some(path) => load_config(&path)?,
        None => Config::default(),
    };
    init_tracing(config.logging.format);
    info!("Starting taskweave v{}", env!("CARGO_PKG_VERSION"));

    let service = TaskWeave::new(config)?;
    service.start();

    let stop = CancellationToken::new();
    let handler_token = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl-C, shutting down");
        handler_token.cancel();
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
    }

    stop.cancelled().await;
    service.shutdown().await;
    Ok(())
}
