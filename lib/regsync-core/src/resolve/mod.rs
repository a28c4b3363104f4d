//! Resolution of service templates into concrete registry entries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tracing::debug;

use crate::{
    catalog::{ServiceTemplate, ServiceVariant},
    vars::{EnvironmentScope, HostVariableSet},
};

mod address;
pub use self::address::{bare_host, resolve_address, resolve_port, ResolvedPort, DEFAULT_PORT};

mod fields;
pub use self::fields::{resolve_group, resolve_location, resolve_physical_env};

/// A fully resolved registry entry for one address of a service.
///
/// Field order matches the shape the registry accepts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedServiceConfig {
    pub service_name: String,
    pub service_version: String,
    pub service_interface: String,
    pub deployment_scheme: String,
    pub location: Option<String>,
    pub physical_env: Option<String>,
    pub ssl: bool,
    pub group: Option<String>,
    pub address: String,
    pub port: u16,
}

/// Why a service could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ResolutionError {
    #[snafu(display("service not present on env, got address {}", address))]
    AddressNotFound { address: String },

    #[snafu(display("invalid new port, got {}", port))]
    InvalidPort { port: String },
}

impl ResolutionError {
    /// Returns `true` if the service simply has no hosts in this environment.
    ///
    /// Such services are skipped rather than reported as failures.
    pub fn is_not_present(&self) -> bool {
        matches!(self, Self::AddressNotFound { .. })
    }
}

struct Candidate {
    config: ResolvedServiceConfig,
    port: ResolvedPort,
}

/// Resolves service templates within one environment.
pub struct ServiceConfigResolver<'a> {
    scope: &'a EnvironmentScope,
    reserved: &'a BTreeSet<String>,
}

impl<'a> ServiceConfigResolver<'a> {
    /// Creates a resolver for `scope`.
    ///
    /// `reserved` holds the variable names used by the catalog. An address equal to one of them is a placeholder that
    /// never got substituted.
    pub fn new(scope: &'a EnvironmentScope, reserved: &'a BTreeSet<String>) -> Self {
        Self { scope, reserved }
    }

    /// Resolves every variant of `template` against every host.
    ///
    /// With no hosts, each variant is resolved once without host variables. Entries are deduplicated by address,
    /// keeping the first one seen.
    ///
    /// # Errors
    ///
    /// If any entry has an address that did not resolve or a port outside of `0..=65535`, the whole service fails
    /// with the first such problem.
    pub fn resolve(
        &self, template: &ServiceTemplate, hosts: &[HostVariableSet],
    ) -> Result<Vec<ResolvedServiceConfig>, ResolutionError> {
        let hosts = hosts.iter().filter(|host| !host.is_empty()).map(Some).collect::<Vec<_>>();
        let hosts = if hosts.is_empty() { vec![None] } else { hosts };

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for variant in template.variants() {
            for host in &hosts {
                let candidate = self.resolve_one(variant, *host);
                if seen.insert(candidate.config.address.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        let mut resolved = Vec::with_capacity(candidates.len());
        for Candidate { mut config, port } in candidates {
            if !self.is_valid_address(&config.address) {
                debug!(address = %config.address, "Address did not resolve.");
                return AddressNotFound { address: config.address }.fail();
            }

            config.port = match port {
                ResolvedPort::Valid(port) => port,
                ResolvedPort::Invalid(port) => return InvalidPort { port }.fail(),
            };
            resolved.push(config);
        }

        Ok(resolved)
    }

    fn resolve_one(&self, variant: &ServiceVariant, host: Option<&HostVariableSet>) -> Candidate {
        let config = ResolvedServiceConfig {
            service_name: variant.service_name.clone(),
            service_version: variant.service_version.clone(),
            service_interface: variant.service_interface.clone(),
            deployment_scheme: variant.deployment_scheme.clone(),
            location: resolve_location(variant.location.as_deref(), host, self.scope),
            physical_env: resolve_physical_env(variant.physical_env.as_deref(), host),
            ssl: variant.ssl,
            group: resolve_group(variant.group.as_deref(), host),
            address: resolve_address(&variant.address, host, self.scope),
            port: 0,
        };

        Candidate {
            config,
            port: resolve_port(&variant.port, host),
        }
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty() && !address.contains('{') && !self.reserved.contains(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::ServiceCatalog, vars::ENV_CLEANNAME};

    const CATALOG: &str = r#"{
        "tes23": [
            {
                "serviceName": "tes23",
                "serviceVersion": "v1",
                "serviceInterface": "http",
                "deploymentScheme": "default",
                "location": "{SERVER_LOCATION}",
                "physicalEnv": "{POD}",
                "ssl": false,
                "group": "group0{TSA.pool.group}",
                "address": { "default": "{SERVER_FQDN}" },
                "port": "{TES23_PORT}"
            }
        ]
    }"#;

    fn scope() -> EnvironmentScope {
        EnvironmentScope::new("LAB01-T01", "AMS02-Shared-Resources", "sjc01")
    }

    fn host(fqdn: &str, port: &str) -> HostVariableSet {
        HostVariableSet::from_iter([
            (ENV_CLEANNAME, "LAB01-T01"),
            ("SERVER_FQDN", fqdn),
            ("TES23_PORT", port),
            ("SERVER_LOCATION", "SJC01"),
            ("TSA.pool.group", "1"),
        ])
    }

    fn resolve(hosts: &[HostVariableSet]) -> Result<Vec<ResolvedServiceConfig>, ResolutionError> {
        let catalog = ServiceCatalog::from_json_str(CATALOG).unwrap();
        let scope = scope();
        let resolver = ServiceConfigResolver::new(&scope, catalog.required_variables());
        resolver.resolve(catalog.get("tes23").unwrap(), hosts)
    }

    #[test]
    fn resolves_local_host() {
        let configs = resolve(&[host("lab01-t01-tes23.mydomain", "8080")]).unwrap();

        similar_asserts::assert_eq!(
            configs,
            vec![ResolvedServiceConfig {
                service_name: "tes23".to_string(),
                service_version: "v1".to_string(),
                service_interface: "http".to_string(),
                deployment_scheme: "default".to_string(),
                location: Some("sjc01".to_string()),
                physical_env: Some("p01".to_string()),
                ssl: false,
                group: Some("group01".to_string()),
                address: "lab01-t01-tes23.mydomain".to_string(),
                port: 8080,
            }]
        );
    }

    #[test]
    fn serializes_in_registry_shape() {
        let configs = resolve(&[host("lab01-t01-tes23.mydomain", "8080")]).unwrap();
        let json = serde_json::to_string(&configs[0]).unwrap();

        assert_eq!(
            json,
            r#"{"serviceName":"tes23","serviceVersion":"v1","serviceInterface":"http","deploymentScheme":"default","location":"sjc01","physicalEnv":"p01","ssl":false,"group":"group01","address":"lab01-t01-tes23.mydomain","port":8080}"#
        );
    }

    #[test]
    fn duplicate_addresses_keep_first() {
        let configs = resolve(&[
            host("a.mydomain", "8080"),
            host("http://a.mydomain:9000", "9000"),
            host("b.mydomain", "8081"),
        ])
        .unwrap();

        let summary = configs.iter().map(|c| (c.address.as_str(), c.port)).collect::<Vec<_>>();
        assert_eq!(summary, vec![("a.mydomain", 8080), ("b.mydomain", 8081)]);
    }

    #[test]
    fn no_hosts_means_not_present() {
        let error = resolve(&[]).unwrap_err();

        assert_eq!(
            error,
            ResolutionError::AddressNotFound {
                address: "SERVER_FQDN".to_string()
            }
        );
        assert!(error.is_not_present());
        assert_eq!(error.to_string(), "service not present on env, got address SERVER_FQDN");
    }

    #[test]
    fn one_bad_entry_fails_the_service() {
        let error = resolve(&[host("a.mydomain", "8080"), host("b.mydomain", "70000")]).unwrap_err();

        assert_eq!(error.to_string(), "invalid new port, got 70000");
        assert!(!error.is_not_present());
    }

    #[test]
    fn empty_hosts_count_as_absent() {
        let error = resolve(&[HostVariableSet::new()]).unwrap_err();
        assert!(error.is_not_present());
    }
}
