use std::{path::Path, sync::Arc};

use regsync_config::GenericConfiguration;
use regsync_core::{
    filter::ServiceFilter,
    reconcile::{DiffReport, EnvironmentSession, Reconciler, SchemesReport, ShowReport},
    scheme::DeploymentSchemeTemplate,
    Inventory, Registry, ServiceCatalog,
};
use regsync_env::{FileInventory, MemoryRegistry, RegistryClient, RegistryClientConfiguration};
use regsync_error::{generic_error, ErrorContext as _, GenericError};
use tracing::{error, info, warn};

use crate::{
    config::RunConfiguration,
    report::{RolloutReport, UpdateRun},
};

type SharedInventory = Arc<dyn Inventory>;
type SharedRegistry = Arc<dyn Registry>;

/// Runs commands against environments, sharing the catalog and collaborators between them.
pub struct Runner {
    config: RunConfiguration,
    catalog: Arc<ServiceCatalog>,
    inventory: SharedInventory,
    registry: SharedRegistry,
}

impl Runner {
    /// Loads the catalog and sets up the inventory and registry described by `config`.
    ///
    /// # Errors
    ///
    /// If the catalog or the inventory snapshot cannot be loaded, or the registry client cannot be created, an error is
    /// returned.
    pub async fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        let run_config = RunConfiguration::from_configuration(config)?;

        let catalog = ServiceCatalog::from_path(run_config.catalog_path())?;
        info!(
            path = %run_config.catalog_path().display(),
            services = catalog.len(),
            "Loaded service catalog."
        );

        let inventory_path = run_config
            .inventory_path()
            .ok_or_else(|| generic_error!("No inventory configured. Set `inventory_path`."))?;
        let inventory = FileInventory::from_path(inventory_path).await?;

        let registry: SharedRegistry = if run_config.has_remote_registry() {
            let client_config = RegistryClientConfiguration::from_configuration(config)?;
            Arc::new(RegistryClient::new(client_config).error_context("Failed to create registry client.")?)
        } else if let Some(path) = run_config.registry_snapshot_path() {
            info!(path = %path.display(), "Using in-memory registry seeded from snapshot.");
            Arc::new(MemoryRegistry::from_snapshot_file(path).await?)
        } else {
            warn!("No registry configured. Using an empty in-memory registry.");
            Arc::new(MemoryRegistry::new())
        };

        Ok(Self::new(run_config, catalog, Arc::new(inventory), registry))
    }

    pub fn new(
        config: RunConfiguration, catalog: ServiceCatalog, inventory: SharedInventory, registry: SharedRegistry,
    ) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
            inventory,
            registry,
        }
    }

    async fn reconciler(&self, environment: &str) -> Result<Reconciler<SharedInventory, SharedRegistry>, GenericError> {
        let session = EnvironmentSession::open(
            Arc::clone(&self.inventory),
            Arc::clone(&self.registry),
            environment,
            self.config.default_shared_env(),
        )
        .await?;

        Ok(Reconciler::new(session, Arc::clone(&self.catalog)).with_concurrency(self.config.concurrency()))
    }

    fn scheme_template(&self) -> Result<DeploymentSchemeTemplate, GenericError> {
        Ok(DeploymentSchemeTemplate::from_path(self.config.deployment_schemes_path())?)
    }

    /// Updates the services of `environment`.
    ///
    /// With `with_schemes`, the deployment schemes are registered first and the services are only touched once that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// If the environment cannot be opened, the scheme template cannot be loaded, or the deployment schemes cannot be
    /// registered, an error is returned and no service is updated.
    pub async fn update(
        &self, environment: &str, filter: &ServiceFilter, force: bool, with_schemes: bool,
    ) -> Result<UpdateRun, GenericError> {
        let template = with_schemes.then(|| self.scheme_template()).transpose()?;

        let reconciler = self.reconciler(environment).await?;

        let schemes = match template {
            Some(template) => {
                let report = reconciler.update_deployment_schemes(&template).await;
                if !report.status {
                    return Err(generic_error!(
                        "Unable to update deployment schemes: {}",
                        report.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                Some(report)
            }
            None => None,
        };

        let services = reconciler.update_all(filter, force).await;

        Ok(UpdateRun {
            environment: reconciler.session().info().name.clone(),
            services,
            schemes,
        })
    }

    pub async fn diff(&self, environment: &str, filter: &ServiceFilter) -> Result<DiffReport, GenericError> {
        let reconciler = self.reconciler(environment).await?;
        Ok(reconciler.diff_all(filter).await)
    }

    pub async fn show(&self, environment: &str, filter: &ServiceFilter) -> Result<ShowReport, GenericError> {
        let reconciler = self.reconciler(environment).await?;
        Ok(reconciler.show_all(filter))
    }

    pub async fn schemes(&self, environment: &str) -> Result<SchemesReport, GenericError> {
        let template = self.scheme_template()?;
        let reconciler = self.reconciler(environment).await?;
        Ok(reconciler.update_deployment_schemes(&template).await)
    }

    /// Updates each environment listed in `path`, in order.
    ///
    /// An environment that cannot be processed is recorded as failed and the rollout moves on to the next one.
    pub async fn rollout(
        &self, path: &Path, filter: &ServiceFilter, force: bool, with_schemes: bool,
    ) -> Result<RolloutReport, GenericError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_error_context(|| format!("Failed to read environment list '{}'.", path.display()))?;
        let environments = parse_environment_list(&contents);
        info!(environments = environments.len(), "Starting rollout.");

        let mut report = RolloutReport::default();
        for environment in environments {
            match self.update(environment, filter, force, with_schemes).await {
                Ok(run) => {
                    if run.succeeded() {
                        info!(environment, "Environment updated.");
                        report.completed.push(environment.to_string());
                    } else {
                        warn!(environment, failed = run.services.failed.len(), "Environment updated with failures.");
                        report.failed.push(environment.to_string());
                    }
                    report.runs.push(run);
                }
                Err(e) => {
                    error!(environment, error = %format_args!("{:#}", e), "Failed to update environment.");
                    report.failed.push(environment.to_string());
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Rollout finished."
        );
        Ok(report)
    }
}

/// Environment names listed one per line. Blank lines are ignored.
fn parse_environment_list(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
