//! Support for structured logging.

use anyhow::{format_err, Result};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Send `tracing` output to standard error, filtered by `RUST_LOG`.
///
/// Our normal progress messages go to standard output, so this stays quiet
/// unless asked.
pub(crate) fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| format_err!("could not set up logging: {}", err))
}
