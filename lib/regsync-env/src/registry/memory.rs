use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use async_trait::async_trait;
use regsync_core::{
    normalize::{CurrentRegistry, NativeServiceRecord},
    resolve::ResolvedServiceConfig,
    scheme::ResolvedDeploymentScheme,
    sources::Registry,
};
use regsync_error::{ErrorContext as _, GenericError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

type ServiceMap = BTreeMap<String, Vec<NativeServiceRecord>>;

/// An in-memory registry.
///
/// Stands in for the real registry in dry runs and tests. Registrations replace the records of a service, deletions
/// remove the records whose address matches, and deployment schemes are stored as given.
#[derive(Default)]
pub struct MemoryRegistry {
    services: Mutex<HashMap<String, ServiceMap>>,
    schemes: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a registry snapshot from a YAML (or JSON) file.
    ///
    /// The file maps environment identifiers to services, and services to their registry records.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed, an error is returned.
    pub async fn from_snapshot_file<P>(path: P) -> Result<Self, GenericError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_error_context(|| format!("Failed to read registry snapshot '{}'.", path.display()))?;
        let snapshot: HashMap<String, ServiceMap> = serde_yaml::from_str(&contents)
            .with_error_context(|| format!("Failed to parse registry snapshot '{}'.", path.display()))?;

        Ok(Self {
            services: Mutex::new(snapshot),
            schemes: Mutex::default(),
        })
    }

    /// Seeds the services of `environment_id`.
    pub fn with_services(mut self, environment_id: &str, services: ServiceMap) -> Self {
        self.services.get_mut().insert(environment_id.to_string(), services);
        self
    }

    /// Records currently held for `environment_id`.
    pub async fn services(&self, environment_id: &str) -> ServiceMap {
        self.services
            .lock()
            .await
            .get(environment_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deployment schemes last registered for `environment_id`.
    pub async fn deployment_schemes(&self, environment_id: &str) -> Vec<Value> {
        self.schemes
            .lock()
            .await
            .get(environment_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn current_services(&self, environment_id: &str) -> Result<CurrentRegistry, GenericError> {
        Ok(CurrentRegistry::new(self.services(environment_id).await))
    }

    async fn register_service(
        &self, service: &str, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError> {
        let records = configs.iter().map(NativeServiceRecord::from).collect::<Vec<_>>();
        debug!(service, environment_id, records = records.len(), "Registering service in memory.");

        self.services
            .lock()
            .await
            .entry(environment_id.to_string())
            .or_default()
            .insert(service.to_string(), records);
        Ok(true)
    }

    async fn delete_service(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError> {
        let mut environments = self.services.lock().await;
        let Some(services) = environments.get_mut(environment_id) else {
            return Ok(true);
        };

        if let Some(existing) = services.get_mut(service) {
            existing.retain(|record| !records.iter().any(|deleted| deleted.address == record.address));
            if existing.is_empty() {
                services.remove(service);
            }
        }

        debug!(service, environment_id, "Deleted service records in memory.");
        Ok(true)
    }

    async fn register_deployment_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError> {
        let schemes = schemes
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .error_context("Failed to serialize deployment schemes.")?;

        self.schemes.lock().await.insert(environment_id.to_string(), schemes);
        Ok(true)
    }
}
