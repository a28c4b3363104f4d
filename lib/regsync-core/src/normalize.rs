//! The registry's current view of an environment, and its normalized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resolve::ResolvedServiceConfig;

/// A service record exactly as the registry reports it.
///
/// Fields the registry adds for its own bookkeeping (`order`, `pods`, `newModel` and anything else unknown) are
/// kept in `extra` so the record can be sent back verbatim when deleting it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeServiceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&ResolvedServiceConfig> for NativeServiceRecord {
    fn from(config: &ResolvedServiceConfig) -> Self {
        Self {
            name: Some(config.service_name.clone()),
            version: Some(config.service_version.clone()),
            service_interface: Some(config.service_interface.clone()),
            deployment_scheme: Some(config.deployment_scheme.clone()),
            location: config.location.clone(),
            selected_pod: config.physical_env.clone(),
            ssl: Some(config.ssl),
            group: config.group.clone(),
            address: Some(config.address.clone()),
            port: Some(i64::from(config.port)),
            extra: Map::new(),
        }
    }
}

/// A registry record in the same shape as a resolved config.
///
/// Every field is optional since the registry does not guarantee any of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentServiceConfig {
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub service_interface: Option<String>,
    pub deployment_scheme: Option<String>,
    pub location: Option<String>,
    pub physical_env: Option<String>,
    pub ssl: Option<bool>,
    pub group: Option<String>,
    pub address: Option<String>,
    pub port: Option<i64>,
}

impl From<&NativeServiceRecord> for CurrentServiceConfig {
    fn from(record: &NativeServiceRecord) -> Self {
        Self {
            service_name: record.name.clone(),
            service_version: record.version.clone(),
            service_interface: record.service_interface.clone(),
            deployment_scheme: record.deployment_scheme.clone(),
            location: record.location.clone(),
            physical_env: record.selected_pod.clone(),
            ssl: record.ssl,
            group: record.group.clone(),
            address: record.address.clone(),
            port: record.port,
        }
    }
}

/// Normalizes registry records for comparison, sorted by address.
pub fn normalize_current(records: &[NativeServiceRecord]) -> Vec<CurrentServiceConfig> {
    let mut normalized = records.iter().map(CurrentServiceConfig::from).collect::<Vec<_>>();
    normalized.sort_by(|a, b| a.address.cmp(&b.address));
    normalized
}

/// Every service currently registered in an environment, keyed by service name.
///
/// Fetched once per session and shared read-only by all workers.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CurrentRegistry {
    services: BTreeMap<String, Vec<NativeServiceRecord>>,
}

impl CurrentRegistry {
    pub fn new(services: BTreeMap<String, Vec<NativeServiceRecord>>) -> Self {
        Self { services }
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Raw records of `service`, empty if it is not registered.
    pub fn records(&self, service: &str) -> &[NativeServiceRecord] {
        self.services.get(service).map(Vec::as_slice).unwrap_or_default()
    }

    /// Normalized records of `service`, empty if it is not registered.
    pub fn normalized(&self, service: &str) -> Vec<CurrentServiceConfig> {
        normalize_current(self.records(service))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
