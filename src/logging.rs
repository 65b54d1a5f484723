//! Subscriber setup for the command-line binary

use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let default_filter = if verbose {
        "nova_sweep=debug"
    } else {
        "nova_sweep=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.with_line_number(verbose).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| Error::Configuration {
        reason: format!("failed to install log subscriber: {}", e),
    })
}
