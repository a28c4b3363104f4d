use regsync_config::GenericConfiguration;
use regsync_error::{generic_error, ErrorContext as _, GenericError};
use serde::Deserialize;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn default_log_level() -> LogLevel {
    LogLevel(LevelFilter::INFO.to_string())
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfiguration {
    /// Filtering directives, in `RUST_LOG` syntax.
    ///
    /// Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Whether to emit JSON lines instead of human-readable output.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub log_format_json: bool,
}

impl LoggingConfiguration {
    /// Creates a new `LoggingConfiguration` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the logging keys are present but invalid, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        config
            .as_typed()
            .error_context("Failed to parse logging configuration.")
    }
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format_json: false,
        }
    }
}

/// Validated log filtering directives.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct LogLevel(String);

impl LogLevel {
    /// Builds the filter these directives describe.
    pub fn as_env_filter(&self) -> EnvFilter {
        // Already validated in `try_from`.
        EnvFilter::builder().parse_lossy(&self.0)
    }
}

impl TryFrom<String> for LogLevel {
    type Error = GenericError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(generic_error!("Log level cannot be empty."));
        }

        EnvFilter::builder()
            .parse(&value)
            .error_context("Failed to parse valid log level.")?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        let config: LoggingConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config.log_level.0, "info");
        assert!(!config.log_format_json);
    }

    #[test]
    fn accepts_directives() {
        let config: LoggingConfiguration =
            serde_json::from_str(r#"{"log_level": "regsync_core=debug,warn", "log_format_json": true}"#).unwrap();
        assert_eq!(config.log_level.0, "regsync_core=debug,warn");
        assert!(config.log_format_json);
    }

    #[test]
    fn rejects_empty_level() {
        assert!(serde_json::from_str::<LoggingConfiguration>(r#"{"log_level": ""}"#).is_err());
    }
}
