//! Per-service reconciliation and the worker pool driving it.
//!
//! A run starts by opening an [`EnvironmentSession`], which pins down the environment's identity and takes a
//! snapshot of what the registry currently holds. A [`Reconciler`] then works through the selected services
//! concurrently: each one is resolved, diffed against the snapshot, and, when updating, added or recreated.
//!
//! Failures are isolated per service. A service that cannot be resolved, or whose registry calls fail, ends up as a
//! failed entry in the report without affecting the others.

use std::sync::Arc;

use futures::stream::{self, StreamExt as _};
use regsync_error::GenericError;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, error, info, warn};

use crate::{
    catalog::ServiceCatalog,
    diff::ConfigDiff,
    discovery::HostDiscovery,
    error::{EnvironmentIdentity, FatalError, RegistrySnapshot},
    filter::{select_candidates, RunMode, ServiceFilter},
    normalize::{CurrentRegistry, CurrentServiceConfig},
    resolve::{ResolutionError, ResolvedServiceConfig, ServiceConfigResolver},
    scheme::{resolve_schemes, DeploymentSchemeTemplate, TopologySummary},
    sources::{EnvironmentInfo, Inventory, Registry},
    vars::EnvironmentScope,
};

mod outcome;
pub use self::outcome::{DiffOutcome, DiffResult, Plan, SkipReason, UpdateOutcome, UpdateResult};
use self::outcome::{MESSAGE_ADDED, MESSAGE_RECREATED, MESSAGE_TRANSPORT};

mod report;
pub use self::report::{DiffReport, SchemesReport, ShowReport, UpdateReport};

/// Default number of services reconciled at the same time.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Why the desired config of a service is unavailable.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigError {
    #[snafu(display("service '{}' is not in the catalog", service))]
    UnknownService { service: String },

    #[snafu(display("{}", source))]
    Resolution { source: ResolutionError },

    #[snafu(display("failed to discover hosts: {:#}", source))]
    Discovery { source: GenericError },
}

impl ConfigError {
    /// Returns `true` if the service has no hosts in the environment.
    pub fn is_not_present(&self) -> bool {
        matches!(self, Self::Resolution { source } if source.is_not_present())
    }
}

/// Current and desired configs of one service, with their diff.
#[derive(Debug)]
pub struct ServiceConfigs {
    pub current: Vec<CurrentServiceConfig>,
    pub desired: Result<Vec<ResolvedServiceConfig>, ConfigError>,
    pub diff: ConfigDiff,
}

/// An environment being reconciled.
///
/// Holds the collaborators, the environment's identity, and the registry snapshot taken when the session was opened.
/// The snapshot is never refreshed: every decision made within a session is based on it.
pub struct EnvironmentSession<I, R> {
    inventory: I,
    registry: R,
    info: EnvironmentInfo,
    scope: EnvironmentScope,
    current: Arc<CurrentRegistry>,
}

impl<I, R> EnvironmentSession<I, R>
where
    I: Inventory,
    R: Registry,
{
    /// Opens a session for the environment called `name`.
    ///
    /// If the inventory does not name a shared environment, `default_shared_env` is used.
    ///
    /// # Errors
    ///
    /// If the environment cannot be looked up, or the registry snapshot cannot be fetched, an error is returned.
    pub async fn open(inventory: I, registry: R, name: &str, default_shared_env: &str) -> Result<Self, FatalError> {
        let info = inventory
            .describe_environment(name)
            .await
            .context(EnvironmentIdentity { name })?;

        let shared_env = info
            .shared_env
            .clone()
            .filter(|shared| !shared.is_empty())
            .unwrap_or_else(|| default_shared_env.to_string());
        let scope = EnvironmentScope::new(&info.name, shared_env, &info.location);

        let current = registry
            .current_services(&info.id)
            .await
            .context(RegistrySnapshot { name })?;

        info!(
            environment = scope.local_name(),
            id = %info.id,
            location = scope.location(),
            shared_environment = scope.shared_name(),
            registered_services = current.len(),
            "Opened environment session."
        );

        Ok(Self {
            inventory,
            registry,
            info,
            scope,
            current: Arc::new(current),
        })
    }

    pub fn info(&self) -> &EnvironmentInfo {
        &self.info
    }

    pub fn environment_id(&self) -> &str {
        &self.info.id
    }

    pub fn scope(&self) -> &EnvironmentScope {
        &self.scope
    }

    /// The registry snapshot taken when the session was opened.
    pub fn current(&self) -> &Arc<CurrentRegistry> {
        &self.current
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }
}

/// Reconciles the services of a catalog against one environment.
pub struct Reconciler<I, R> {
    session: EnvironmentSession<I, R>,
    catalog: Arc<ServiceCatalog>,
    variables: Vec<String>,
    concurrency: usize,
}

impl<I, R> Reconciler<I, R>
where
    I: Inventory,
    R: Registry,
{
    pub fn new(session: EnvironmentSession<I, R>, catalog: Arc<ServiceCatalog>) -> Self {
        let variables = catalog.required_variables().iter().cloned().collect();
        Self {
            session,
            catalog,
            variables,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many services are reconciled at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn session(&self) -> &EnvironmentSession<I, R> {
        &self.session
    }

    /// Services a run in `mode` would process.
    pub fn candidates(&self, filter: &ServiceFilter, mode: RunMode) -> Vec<String> {
        select_candidates(&self.catalog, &self.session.current, filter, mode)
    }

    /// Normalized registry records of `service`.
    pub fn current(&self, service: &str) -> Vec<CurrentServiceConfig> {
        self.session.current.normalized(service)
    }

    /// Works out the desired config of `service` and diffs it against the registry snapshot.
    pub async fn service_configs(&self, service: &str) -> ServiceConfigs {
        let current = self.current(service);
        let desired = self.desired(service).await;

        let diff = match &desired {
            Ok(desired) => ConfigDiff::between(&current, desired),
            Err(_) => ConfigDiff::between::<_, ResolvedServiceConfig>(&current, &[]),
        };

        ServiceConfigs { current, desired, diff }
    }

    async fn desired(&self, service: &str) -> Result<Vec<ResolvedServiceConfig>, ConfigError> {
        let template = self
            .catalog
            .get(service)
            .ok_or_else(|| UnknownService { service }.build())?;

        let discovery = HostDiscovery::new(
            &self.session.inventory,
            &self.session.info.name,
            self.session.scope.shared_name(),
            &self.variables,
        )
        .with_concurrency(self.concurrency);
        let hosts = discovery
            .fetch_hosts(service, template.source_service())
            .await
            .context(Discovery)?;

        let resolver = ServiceConfigResolver::new(&self.session.scope, self.catalog.required_variables());
        resolver.resolve(template, &hosts).context(Resolution)
    }

    /// Brings the registry entry of `service` in line with the catalog.
    ///
    /// Without `force`, a service that is already registered is left alone even if it differs.
    pub async fn update(&self, service: &str, force: bool) -> UpdateResult {
        let ServiceConfigs { desired, diff, .. } = self.service_configs(service).await;
        let registered = self.session.current.contains(service);
        let environment_id = self.session.environment_id();

        let plan = Plan::decide(desired.as_deref(), &diff, registered, force);
        debug!(service, ?plan, "Planned service update.");

        let desired = match (plan, desired) {
            (Plan::Skip(reason), _) => return UpdateResult::skipped(reason, diff),
            (Plan::Fail(message), _) => {
                warn!(service, error = %message, "Failed to resolve service.");
                return UpdateResult::failed(message, diff);
            }
            (Plan::Add, Ok(desired)) => {
                return match self.session.registry.register_service(service, environment_id, &desired).await {
                    Ok(true) => UpdateResult {
                        status: true,
                        message: Some(MESSAGE_ADDED.to_string()),
                        updated: true,
                        config_diff: diff,
                        ..Default::default()
                    },
                    Ok(false) => UpdateResult::failed("registry rejected the registration", diff),
                    Err(e) => transport_failure(service, e, diff),
                };
            }
            (Plan::Recreate, Ok(desired)) => desired,
            (Plan::Add | Plan::Recreate, Err(e)) => return UpdateResult::failed(e.to_string(), diff),
        };

        let existing = self.session.current.records(service);
        match self.session.registry.delete_service(service, environment_id, existing).await {
            Ok(true) => {}
            Ok(false) => return UpdateResult::failed("registry rejected the deletion", diff),
            Err(e) => return transport_failure(service, e, diff),
        }

        match self.session.registry.register_service(service, environment_id, &desired).await {
            Ok(true) => UpdateResult {
                status: true,
                message: Some(MESSAGE_RECREATED.to_string()),
                updated: true,
                old_deleted: true,
                config_diff: diff,
                ..Default::default()
            },
            Ok(false) => UpdateResult {
                old_deleted: true,
                ..UpdateResult::failed("registry rejected the registration", diff)
            },
            Err(e) => UpdateResult {
                old_deleted: true,
                ..transport_failure(service, e, diff)
            },
        }
    }

    /// Compares the registry entry of `service` with the catalog, without changing anything.
    pub async fn diff(&self, service: &str) -> DiffResult {
        let ServiceConfigs { current, desired, diff } = self.service_configs(service).await;
        let registered = self.session.current.contains(service);

        match desired {
            Ok(new_config) => DiffResult {
                status: true,
                message: "ok".to_string(),
                current_config: current,
                new_config,
                config_diff: diff,
                not_present: false,
                registered,
            },
            Err(e) => DiffResult {
                status: false,
                message: e.to_string(),
                current_config: current,
                new_config: Vec::new(),
                config_diff: diff,
                not_present: e.is_not_present(),
                registered,
            },
        }
    }

    /// Updates every selected service.
    pub async fn update_all(&self, filter: &ServiceFilter, force: bool) -> UpdateReport {
        let services = self.candidates(filter, RunMode::Update { force });
        info!(
            environment = self.session.scope.local_name(),
            services = services.len(),
            force,
            "Updating services."
        );

        let results = stream::iter(services.iter().cloned())
            .map(|service| async move {
                let result = self.update(&service, force).await;
                (service, result)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let report = UpdateReport::from_results(force, services, results);
        info!(
            added = report.added.len(),
            recreated = report.recreated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Update finished."
        );
        report
    }

    /// Diffs every selected service.
    pub async fn diff_all(&self, filter: &ServiceFilter) -> DiffReport {
        let services = self.candidates(filter, RunMode::Diff);
        info!(
            environment = self.session.scope.local_name(),
            services = services.len(),
            "Diffing services."
        );

        let results = stream::iter(services)
            .map(|service| async move {
                let result = self.diff(&service).await;
                (service, result)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        DiffReport::from_results(results)
    }

    /// Registry contents of every selected service.
    pub fn show_all(&self, filter: &ServiceFilter) -> ShowReport {
        self.candidates(filter, RunMode::Show)
            .into_iter()
            .map(|service| {
                let current = self.current(&service);
                (service, current)
            })
            .collect()
    }

    /// Instantiates the deployment schemes matching the environment's topology and registers them.
    pub async fn update_deployment_schemes(&self, template: &DeploymentSchemeTemplate) -> SchemesReport {
        let environment_id = self.session.environment_id();

        let topology = match self.session.inventory.topology(&self.session.info.name).await {
            Ok(topology) => topology,
            Err(e) => {
                error!(error = %e, "Failed to fetch topology.");
                return SchemesReport {
                    error: Some(format!("{:#}", e)),
                    ..Default::default()
                };
            }
        };

        let summary = TopologySummary::from_topology(&topology);
        let environment_class = summary.environment_class();
        let schemes = match resolve_schemes(&summary, template) {
            Ok(schemes) => schemes,
            Err(e) => {
                error!(error = %e, "Failed to resolve deployment schemes.");
                return SchemesReport {
                    environment_class: Some(environment_class),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let names = schemes.iter().map(|scheme| scheme.name.clone()).collect::<Vec<_>>();
        info!(class = environment_class.as_str(), schemes = ?names, "Registering deployment schemes.");

        let (status, error) = match self
            .session
            .registry
            .register_deployment_schemes(environment_id, &schemes)
            .await
        {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("registry rejected the deployment schemes".to_string())),
            Err(e) => {
                error!(error = %e, "Failed to register deployment schemes.");
                (false, Some(MESSAGE_TRANSPORT.to_string()))
            }
        };

        SchemesReport {
            status,
            environment_class: Some(environment_class),
            message: names,
            error,
        }
    }
}

fn transport_failure(service: &str, error: GenericError, diff: ConfigDiff) -> UpdateResult {
    error!(service, error = %format_args!("{:#}", error), "Registry call failed.");
    UpdateResult::failed(MESSAGE_TRANSPORT, diff)
}

#[cfg(test)]
mod tests;
