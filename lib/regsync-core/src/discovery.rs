//! Discovery of the hosts backing a service.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use regsync_error::{ErrorContext as _, GenericError};
use tracing::debug;

use crate::{reconcile::DEFAULT_CONCURRENCY, sources::Inventory, vars::HostVariableSet};

/// Finds the hosts of a service and fetches their variables.
///
/// Hosts are looked up by role, first in the local environment and then in the shared one. When the service sources
/// its hosts from another service, that role is tried before the service's own name in each environment.
pub struct HostDiscovery<'a, I> {
    inventory: &'a I,
    local_env: &'a str,
    shared_env: &'a str,
    variables: &'a [String],
    concurrency: usize,
}

impl<'a, I> HostDiscovery<'a, I>
where
    I: Inventory,
{
    pub fn new(inventory: &'a I, local_env: &'a str, shared_env: &'a str, variables: &'a [String]) -> Self {
        Self {
            inventory,
            local_env,
            shared_env,
            variables,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many hosts have their variables fetched at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns the variables of every host backing `service`, in discovery order.
    ///
    /// An empty result means the service has no hosts in either environment.
    ///
    /// # Errors
    ///
    /// If the inventory cannot be queried, an error is returned.
    pub async fn fetch_hosts(
        &self, service: &str, source_service: Option<&str>,
    ) -> Result<Vec<HostVariableSet>, GenericError> {
        let hosts = self.find_hosts(service, source_service).await?;
        if hosts.is_empty() {
            debug!(service, "No hosts found in local or shared environment.");
            return Ok(Vec::new());
        }

        stream::iter(hosts.iter())
            .map(|host| async move {
                self.inventory
                    .host_variables(host, self.variables)
                    .await
                    .with_error_context(|| format!("Failed to fetch variables of host '{}'.", host))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn find_hosts(&self, service: &str, source_service: Option<&str>) -> Result<Vec<String>, GenericError> {
        let roles = match source_service {
            Some(source) if source != service => vec![source, service],
            _ => vec![service],
        };

        for environment in [self.local_env, self.shared_env] {
            for role in &roles {
                let mut hosts = self
                    .inventory
                    .hosts_by_role(environment, role)
                    .await
                    .with_error_context(|| format!("Failed to list '{}' hosts of '{}'.", role, environment))?;

                if !hosts.is_empty() {
                    let mut seen = BTreeSet::new();
                    hosts.retain(|host| seen.insert(host.clone()));

                    debug!(service, role, environment, hosts = hosts.len(), "Discovered hosts.");
                    return Ok(hosts);
                }
            }
        }

        Ok(Vec::new())
    }
}
