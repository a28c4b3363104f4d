//! Logging.

use regsync_error::GenericError;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

mod config;
pub use self::config::{LogLevel, LoggingConfiguration};

/// Logs a message to standard error and exits the process with exit code 2.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(2);
}

/// Initializes the `tracing` subscriber for the process.
///
/// Logs go to standard error so that command output on standard output (reports, JSON documents) stays clean.
///
/// # Errors
///
/// If a global subscriber was already installed, an error is returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<(), GenericError> {
    let output_layer = if config.log_format_json {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(output_layer.with_filter(config.log_level.as_env_filter()))
        .try_init()?;

    Ok(())
}
