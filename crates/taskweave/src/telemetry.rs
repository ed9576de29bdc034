//! Tracing subscriber setup.
//!
//! Library code logs through both `tracing` and `log` macros; the `log`
//! records are forwarded into tracing by `tracing-log`.

use std::sync::OnceLock;

use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "taskweave=info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
/// Calling this more than once is a no-op.
pub fn init_tracing(format: LogFormat) {
    INITIALIZED.get_or_init(|| {
        if let Err(e) = tracing_log::LogTracer::init() {
            eprintln!("log bridge already installed: {}", e);
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let result = match format {
            LogFormat::Pretty => set_global_default(
                Registry::default()
                    .with(filter)
                    .with(fmt::layer().with_target(true)),
            ),
            LogFormat::Json => set_global_default(
                Registry::default()
                    .with(filter)
                    .with(fmt::layer().json().with_current_span(true)),
            ),
        };

        if let Err(e) = result {
            eprintln!("tracing subscriber already installed: {}", e);
        }
    });
}
