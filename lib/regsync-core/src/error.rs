use std::path::PathBuf;

use regsync_error::GenericError;
use snafu::Snafu;

/// A failure that aborts a whole run.
///
/// Problems with a single service never surface as a `FatalError`: they are recorded in that service's result and
/// the run continues. These cover the inputs every service depends on.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum FatalError {
    #[snafu(display("Failed to read {} from '{}': {}", what, path.display(), source))]
    ReadDocument {
        what: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse {}: {}", what, source))]
    ParseDocument {
        what: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("Service catalog is invalid: {}", reason))]
    InvalidCatalog { reason: String },

    #[snafu(display("Deployment scheme template is invalid: {}", reason))]
    InvalidSchemeTemplate { reason: String },

    #[snafu(display("Failed to look up environment '{}': {:#}", name, source))]
    EnvironmentIdentity { name: String, source: GenericError },

    #[snafu(display("Failed to fetch current services of environment '{}': {:#}", name, source))]
    RegistrySnapshot { name: String, source: GenericError },
}
