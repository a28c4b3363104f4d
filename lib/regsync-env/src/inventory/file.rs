use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use async_trait::async_trait;
use regsync_core::{
    scheme::{PopLocation, Topology},
    sources::{EnvironmentInfo, Inventory},
    vars::HostVariableSet,
};
use regsync_error::{generic_error, ErrorContext as _, GenericError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvironmentEntry {
    id: String,
    location: String,
    #[serde(default)]
    shared_env: Option<String>,
    #[serde(default)]
    roles: HashMap<String, Vec<String>>,
    #[serde(default)]
    pops: BTreeMap<u32, PopLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventorySnapshot {
    #[serde(default)]
    environments: BTreeMap<String, EnvironmentEntry>,
    #[serde(default)]
    hosts: HashMap<String, BTreeMap<String, String>>,
}

/// An inventory backed by a snapshot file.
///
/// The snapshot is a YAML document listing environments (with their roles and POPs) and hosts (with their
/// variables):
///
/// ```yaml
/// environments:
///   LAB-LEM-AMS:
///     id: "1234"
///     location: ams
///     shared_env: LAB-SHARED
///     roles:
///       tes23: [host-1.lab]
///     pops:
///       1: { location: ams, server_location: ams }
/// hosts:
///   host-1.lab:
///     ENV.CLEANNAME: LAB-LEM-AMS
/// ```
pub struct FileInventory {
    snapshot: InventorySnapshot,
}

impl FileInventory {
    /// Parses an inventory snapshot from a YAML string.
    ///
    /// # Errors
    ///
    /// If the document is not a valid snapshot, an error is returned.
    pub fn from_yaml_str(document: &str) -> Result<Self, GenericError> {
        let snapshot = serde_yaml::from_str(document).error_context("Failed to parse inventory snapshot.")?;
        Ok(Self { snapshot })
    }

    /// Loads an inventory snapshot file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or is not a valid snapshot, an error is returned.
    pub async fn from_path<P>(path: P) -> Result<Self, GenericError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_error_context(|| format!("Failed to read inventory snapshot '{}'.", path.display()))?;

        let inventory = Self::from_yaml_str(&contents)
            .with_error_context(|| format!("Invalid inventory snapshot '{}'.", path.display()))?;
        debug!(
            path = %path.display(),
            environments = inventory.snapshot.environments.len(),
            hosts = inventory.snapshot.hosts.len(),
            "Loaded inventory snapshot."
        );
        Ok(inventory)
    }

    fn environment(&self, name: &str) -> Option<(&str, &EnvironmentEntry)> {
        if let Some((key, entry)) = self.snapshot.environments.get_key_value(name) {
            return Some((key.as_str(), entry));
        }

        self.snapshot
            .environments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, entry)| (key.as_str(), entry))
    }
}

#[async_trait]
impl Inventory for FileInventory {
    async fn describe_environment(&self, name: &str) -> Result<EnvironmentInfo, GenericError> {
        let (name, entry) = self
            .environment(name)
            .ok_or_else(|| generic_error!("Environment '{}' not found in inventory.", name))?;

        Ok(EnvironmentInfo {
            id: entry.id.clone(),
            name: name.to_string(),
            location: entry.location.clone(),
            shared_env: entry.shared_env.clone(),
        })
    }

    async fn hosts_by_role(&self, environment: &str, role: &str) -> Result<Vec<String>, GenericError> {
        Ok(self
            .environment(environment)
            .and_then(|(_, entry)| entry.roles.get(role))
            .cloned()
            .unwrap_or_default())
    }

    async fn host_variables(&self, host: &str, variables: &[String]) -> Result<HostVariableSet, GenericError> {
        let defined = self
            .snapshot
            .hosts
            .get(host)
            .ok_or_else(|| generic_error!("Host '{}' not found in inventory.", host))?;

        Ok(variables
            .iter()
            .filter_map(|name| defined.get(name).map(|value| (name.clone(), value.clone())))
            .collect())
    }

    async fn topology(&self, environment: &str) -> Result<Topology, GenericError> {
        self.environment(environment)
            .map(|(_, entry)| entry.pops.clone())
            .ok_or_else(|| generic_error!("Environment '{}' not found in inventory.", environment))
    }
}
