use std::path::{Path, PathBuf};

use regsync_config::GenericConfiguration;
use regsync_core::reconcile::DEFAULT_CONCURRENCY;
use regsync_error::GenericError;

const DEFAULT_CATALOG_PATH: &str = "conf/services.json";
const DEFAULT_SCHEMES_PATH: &str = "conf/deployment_schemes.json";
const DEFAULT_SHARED_ENV: &str = "AMS02-Shared-Resources";

/// Settings of a run, apart from the registry client's own.
#[derive(Clone, Debug)]
pub struct RunConfiguration {
    catalog_path: PathBuf,
    deployment_schemes_path: PathBuf,
    inventory_path: Option<PathBuf>,
    registry_url: Option<String>,
    registry_snapshot_path: Option<PathBuf>,
    default_shared_env: String,
    concurrency: usize,
}

impl RunConfiguration {
    /// Reads the run configuration.
    ///
    /// # Errors
    ///
    /// If a key has the wrong type, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(Self {
            catalog_path: config
                .try_get_typed("catalog_path")?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH)),
            deployment_schemes_path: config
                .try_get_typed("deployment_schemes_path")?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMES_PATH)),
            inventory_path: config.try_get_typed("inventory_path")?,
            registry_url: config
                .try_get_typed::<String>("registry_url")?
                .filter(|url| !url.is_empty()),
            registry_snapshot_path: config.try_get_typed("registry_snapshot_path")?,
            default_shared_env: config
                .try_get_typed("default_shared_env")?
                .unwrap_or_else(|| DEFAULT_SHARED_ENV.to_string()),
            concurrency: config
                .try_get_typed("concurrency")?
                .unwrap_or(DEFAULT_CONCURRENCY),
        })
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn deployment_schemes_path(&self) -> &Path {
        &self.deployment_schemes_path
    }

    pub fn inventory_path(&self) -> Option<&Path> {
        self.inventory_path.as_deref()
    }

    /// Returns `true` if a remote registry is configured.
    pub fn has_remote_registry(&self) -> bool {
        self.registry_url.is_some()
    }

    pub fn registry_snapshot_path(&self) -> Option<&Path> {
        self.registry_snapshot_path.as_deref()
    }

    pub fn default_shared_env(&self) -> &str {
        &self.default_shared_env
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}
