//! Interfaces to the systems a reconciliation reads from and writes to.

use std::sync::Arc;

use async_trait::async_trait;
use regsync_error::GenericError;
use serde::{Deserialize, Serialize};

use crate::{
    normalize::{CurrentRegistry, NativeServiceRecord},
    resolve::ResolvedServiceConfig,
    scheme::{ResolvedDeploymentScheme, Topology},
    vars::HostVariableSet,
};

/// Identity of an environment, as reported by the inventory.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvironmentInfo {
    /// Identifier the registry knows the environment by.
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// Location of the environment.
    pub location: String,

    /// Environment hosting shared services, if the inventory knows one.
    #[serde(default)]
    pub shared_env: Option<String>,
}

/// Source of environment and host information.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Looks up an environment by name.
    async fn describe_environment(&self, name: &str) -> Result<EnvironmentInfo, GenericError>;

    /// Lists the hosts of `environment` that run `role`.
    async fn hosts_by_role(&self, environment: &str, role: &str) -> Result<Vec<String>, GenericError>;

    /// Gets the values of `variables` on `host`. Variables the host does not define are left out.
    async fn host_variables(&self, host: &str, variables: &[String]) -> Result<HostVariableSet, GenericError>;

    /// Gets the POP topology of `environment`.
    async fn topology(&self, environment: &str) -> Result<Topology, GenericError>;
}

/// The service registry being reconciled.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Gets every service registered in an environment.
    async fn current_services(&self, environment_id: &str) -> Result<CurrentRegistry, GenericError>;

    /// Registers `configs` as the entries of `service`. Returns whether the registry accepted them.
    async fn register_service(
        &self, service: &str, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError>;

    /// Deletes the given records of `service`. Returns whether the registry accepted the deletion.
    async fn delete_service(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError>;

    /// Replaces the deployment schemes of an environment.
    async fn register_deployment_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError>;
}

#[async_trait]
impl<T> Inventory for Arc<T>
where
    T: Inventory + ?Sized,
{
    async fn describe_environment(&self, name: &str) -> Result<EnvironmentInfo, GenericError> {
        (**self).describe_environment(name).await
    }

    async fn hosts_by_role(&self, environment: &str, role: &str) -> Result<Vec<String>, GenericError> {
        (**self).hosts_by_role(environment, role).await
    }

    async fn host_variables(&self, host: &str, variables: &[String]) -> Result<HostVariableSet, GenericError> {
        (**self).host_variables(host, variables).await
    }

    async fn topology(&self, environment: &str) -> Result<Topology, GenericError> {
        (**self).topology(environment).await
    }
}

#[async_trait]
impl<T> Registry for Arc<T>
where
    T: Registry + ?Sized,
{
    async fn current_services(&self, environment_id: &str) -> Result<CurrentRegistry, GenericError> {
        (**self).current_services(environment_id).await
    }

    async fn register_service(
        &self, service: &str, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError> {
        (**self).register_service(service, environment_id, configs).await
    }

    async fn delete_service(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError> {
        (**self).delete_service(service, environment_id, records).await
    }

    async fn register_deployment_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError> {
        (**self).register_deployment_schemes(environment_id, schemes).await
    }
}

#[async_trait]
impl<'a, T> Inventory for &'a T
where
    T: Inventory + ?Sized,
{
    async fn describe_environment(&self, name: &str) -> Result<EnvironmentInfo, GenericError> {
        (**self).describe_environment(name).await
    }

    async fn hosts_by_role(&self, environment: &str, role: &str) -> Result<Vec<String>, GenericError> {
        (**self).hosts_by_role(environment, role).await
    }

    async fn host_variables(&self, host: &str, variables: &[String]) -> Result<HostVariableSet, GenericError> {
        (**self).host_variables(host, variables).await
    }

    async fn topology(&self, environment: &str) -> Result<Topology, GenericError> {
        (**self).topology(environment).await
    }
}

#[async_trait]
impl<'a, T> Registry for &'a T
where
    T: Registry + ?Sized,
{
    async fn current_services(&self, environment_id: &str) -> Result<CurrentRegistry, GenericError> {
        (**self).current_services(environment_id).await
    }

    async fn register_service(
        &self, service: &str, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError> {
        (**self).register_service(service, environment_id, configs).await
    }

    async fn delete_service(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError> {
        (**self).delete_service(service, environment_id, records).await
    }

    async fn register_deployment_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError> {
        (**self).register_deployment_schemes(environment_id, schemes).await
    }
}
