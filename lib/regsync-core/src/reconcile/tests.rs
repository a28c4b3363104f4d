use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use regsync_error::{generic_error, GenericError};
use serde_json::json;

use super::*;
use crate::{
    normalize::NativeServiceRecord,
    scheme::{PopLocation, ResolvedDeploymentScheme, Topology},
    vars::{HostVariableSet, ENV_CLEANNAME},
};

const LOCAL: &str = "LAB-LEM-AMS";
const SHARED: &str = "AMS02-Shared-Resources";

#[derive(Default)]
struct FakeInventory {
    hosts_by_role: BTreeMap<(String, String), Vec<String>>,
    variables: BTreeMap<String, HostVariableSet>,
    topology: Topology,
}

impl FakeInventory {
    fn with_host(mut self, environment: &str, role: &str, host: &str, variables: &[(&str, &str)]) -> Self {
        self.hosts_by_role
            .entry((environment.to_string(), role.to_string()))
            .or_default()
            .push(host.to_string());
        self.variables
            .insert(host.to_string(), variables.iter().copied().collect());
        self
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn describe_environment(&self, name: &str) -> Result<EnvironmentInfo, GenericError> {
        if name != LOCAL {
            return Err(generic_error!("unknown environment '{}'", name));
        }

        Ok(EnvironmentInfo {
            id: "42".to_string(),
            name: name.to_string(),
            location: "AMS02".to_string(),
            shared_env: None,
        })
    }

    async fn hosts_by_role(&self, environment: &str, role: &str) -> Result<Vec<String>, GenericError> {
        Ok(self
            .hosts_by_role
            .get(&(environment.to_string(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn host_variables(&self, host: &str, variables: &[String]) -> Result<HostVariableSet, GenericError> {
        let mut set = self.variables.get(host).cloned().unwrap_or_default();
        set.retain_named(variables.iter().map(String::as_str));
        Ok(set)
    }

    async fn topology(&self, _environment: &str) -> Result<Topology, GenericError> {
        Ok(self.topology.clone())
    }
}

#[derive(Default)]
struct FakeRegistry {
    services: Mutex<BTreeMap<String, Vec<NativeServiceRecord>>>,
    schemes: Mutex<Vec<ResolvedDeploymentScheme>>,
    failing_services: Vec<String>,
    failing_registrations: AtomicUsize,
    deletions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRegistry {
    fn with_service(self, service: &str, records: serde_json::Value) -> Self {
        let records = serde_json::from_value(records).unwrap();
        self.services.lock().unwrap().insert(service.to_string(), records);
        self
    }

    fn failing(mut self, service: &str) -> Self {
        self.failing_services.push(service.to_string());
        self
    }

    /// Fails the next `count` registrations, whatever the service. Deletions keep working.
    fn failing_next_registrations(self, count: usize) -> Self {
        self.failing_registrations.store(count, Ordering::SeqCst);
        self
    }

    fn snapshot(&self) -> BTreeMap<String, Vec<NativeServiceRecord>> {
        self.services.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn current_services(&self, _environment_id: &str) -> Result<CurrentRegistry, GenericError> {
        Ok(CurrentRegistry::new(self.snapshot()))
    }

    async fn register_service(
        &self, service: &str, _environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_services.iter().any(|s| s == service) {
            return Err(generic_error!("connection reset by peer"));
        }

        let fail_this_one = self
            .failing_registrations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| remaining.checked_sub(1))
            .is_ok();
        if fail_this_one {
            return Err(generic_error!("502 Bad Gateway"));
        }

        let records = configs
            .iter()
            .map(|config| {
                let mut record = NativeServiceRecord::from(config);
                record.extra.insert("order".to_string(), json!(1));
                record
            })
            .collect();
        self.services.lock().unwrap().insert(service.to_string(), records);
        Ok(true)
    }

    async fn delete_service(
        &self, service: &str, _environment_id: &str, _records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError> {
        self.deletions.fetch_add(1, Ordering::SeqCst);
        self.services.lock().unwrap().remove(service);
        Ok(true)
    }

    async fn register_deployment_schemes(
        &self, _environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError> {
        *self.schemes.lock().unwrap() = schemes.to_vec();
        Ok(true)
    }
}

fn variant(service: &str) -> serde_json::Value {
    json!({
        "serviceName": service,
        "serviceVersion": "v1",
        "serviceInterface": "http",
        "deploymentScheme": "default",
        "location": "{Server.location}",
        "ssl": false,
        "group": "group0{TRA.pool.group}",
        "address": { "default": "{SERVER_FQDN}" },
        "port": 8080
    })
}

fn catalog(services: &[&str]) -> Arc<ServiceCatalog> {
    let document = services
        .iter()
        .map(|service| (service.to_string(), json!([variant(service)])))
        .collect::<serde_json::Map<_, _>>();
    Arc::new(ServiceCatalog::from_json_str(&serde_json::Value::Object(document).to_string()).unwrap())
}

fn local_host(fqdn: &str) -> Vec<(&str, &str)> {
    vec![
        ("SERVER_FQDN", fqdn),
        ("Server.location", "sjc01"),
        ("TRA.pool.group", "1"),
        (ENV_CLEANNAME, LOCAL),
    ]
}

fn tes23_inventory() -> FakeInventory {
    FakeInventory::default().with_host(LOCAL, "tes23", "host-1", &local_host("lab01-t01-tes23.mydomain"))
}

async fn reconciler<'a>(
    inventory: &'a FakeInventory, registry: &'a FakeRegistry, services: &[&str],
) -> Reconciler<&'a FakeInventory, &'a FakeRegistry> {
    let session = EnvironmentSession::open(inventory, registry, LOCAL, SHARED).await.unwrap();
    Reconciler::new(session, catalog(services))
}

#[tokio::test]
async fn resolves_end_to_end_example() {
    let inventory = tes23_inventory();
    let registry = FakeRegistry::default();
    let reconciler = reconciler(&inventory, &registry, &["tes23"]).await;

    let configs = reconciler.service_configs("tes23").await;
    let desired = configs.desired.unwrap();

    assert_eq!(desired.len(), 1);
    assert_eq!(desired[0].address, "lab01-t01-tes23.mydomain");
    assert_eq!(desired[0].port, 8080);
    assert_eq!(desired[0].location.as_deref(), Some("sjc01"));
    assert_eq!(desired[0].group.as_deref(), Some("group01"));
    assert!(configs.current.is_empty());
    assert!(!configs.diff.is_empty());
}

#[tokio::test]
async fn update_is_idempotent() {
    let inventory = tes23_inventory();
    let registry = FakeRegistry::default();

    let first = reconciler(&inventory, &registry, &["tes23"]).await;
    let result = first.update("tes23", false).await;
    assert_eq!(result.outcome(), UpdateOutcome::Added);
    assert_eq!(result.message.as_deref(), Some("added"));

    let second = reconciler(&inventory, &registry, &["tes23"]).await;
    let result = second.update("tes23", true).await;
    assert!(result.status);
    assert!(!result.updated);
    assert!(result.config_diff.is_empty());
    assert_eq!(result.message.as_deref(), Some("no changes, nothing to update"));
    assert_eq!(result.outcome(), UpdateOutcome::Skipped);

    let report = second.update_all(&ServiceFilter::default(), true).await;
    assert_eq!(report.skipped, vec!["tes23"]);
    assert_eq!(registry.deletions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn forced_update_recreates_changed_service() {
    let inventory = tes23_inventory();
    let registry = FakeRegistry::default().with_service(
        "tes23",
        json!([{ "name": "tes23", "version": "v0", "address": "lab01-t01-tes23.mydomain", "port": 8080, "order": 1 }]),
    );
    let reconciler = reconciler(&inventory, &registry, &["tes23"]).await;

    let diff = reconciler.diff("tes23").await;
    assert_eq!(diff.outcome(), DiffOutcome::Recreate);
    assert_eq!(diff.current_config.len(), 1);

    let unforced = reconciler.update("tes23", false).await;
    assert_eq!(unforced.outcome(), UpdateOutcome::Skipped);
    assert_eq!(registry.deletions.load(Ordering::SeqCst), 0);

    let forced = reconciler.update("tes23", true).await;
    assert_eq!(forced.outcome(), UpdateOutcome::Recreated);
    assert_eq!(forced.message.as_deref(), Some("recreated"));
    assert!(forced.old_deleted);
    assert_eq!(registry.deletions.load(Ordering::SeqCst), 1);
    assert_eq!(registry.snapshot()["tes23"][0].version.as_deref(), Some("v1"));
}

#[tokio::test]
async fn failed_registration_after_delete_is_not_rolled_back() {
    let inventory = tes23_inventory();
    let registry = FakeRegistry::default()
        .with_service(
            "tes23",
            json!([{ "name": "tes23", "version": "v0", "address": "lab01-t01-tes23.mydomain", "port": 8080 }]),
        )
        .failing_next_registrations(1);

    let first = reconciler(&inventory, &registry, &["tes23"]).await;
    let result = first.update("tes23", true).await;
    assert_eq!(result.outcome(), UpdateOutcome::Failed);
    assert_eq!(result.message.as_deref(), Some("HTTPError"));
    assert!(!result.status);
    assert!(!result.updated);
    assert!(result.old_deleted);
    assert_eq!(registry.deletions.load(Ordering::SeqCst), 1);
    assert!(!registry.snapshot().contains_key("tes23"));

    // The next run starts from the emptied registry and registers the service again.
    let second = reconciler(&inventory, &registry, &["tes23"]).await;
    let diff = second.diff("tes23").await;
    assert_eq!(diff.outcome(), DiffOutcome::Add);
    assert!(diff.current_config.is_empty());

    let result = second.update("tes23", false).await;
    assert_eq!(result.outcome(), UpdateOutcome::Added);
    assert_eq!(registry.deletions.load(Ordering::SeqCst), 1);
    assert_eq!(registry.snapshot()["tes23"][0].version.as_deref(), Some("v1"));

    let third = reconciler(&inventory, &registry, &["tes23"]).await;
    assert_eq!(third.diff("tes23").await.outcome(), DiffOutcome::Skip);
}

#[tokio::test]
async fn service_without_hosts_is_skipped() {
    let inventory = FakeInventory::default();
    let registry = FakeRegistry::default();
    let reconciler = reconciler(&inventory, &registry, &["tes23"]).await;

    let result = reconciler.update("tes23", false).await;
    assert!(!result.status);
    assert!(result.is_not_present());
    assert_eq!(result.outcome(), UpdateOutcome::Skipped);
    assert!(result.message.unwrap().contains("not present"));

    let diff = reconciler.diff("tes23").await;
    assert_eq!(diff.outcome(), DiffOutcome::Skip);
}

#[tokio::test]
async fn hosts_are_found_through_source_service_in_shared_environment() {
    let inventory = FakeInventory::default().with_host(
        SHARED,
        "edge",
        "edge-1",
        &[("SERVER_FQDN", "https://edge-1.ams02.mydomain:443"), (ENV_CLEANNAME, "AMS02-SHARED")],
    );
    let registry = FakeRegistry::default();

    let mut template = variant("cdn");
    template["address"]["source_service"] = json!("edge");
    let catalog = Arc::new(
        ServiceCatalog::from_json_str(&json!({ "cdn": [template] }).to_string()).unwrap(),
    );

    let session = EnvironmentSession::open(&inventory, &registry, LOCAL, SHARED).await.unwrap();
    let reconciler = Reconciler::new(session, catalog);

    let desired = reconciler.service_configs("cdn").await.desired.unwrap();
    assert_eq!(desired[0].address, "edge-1.ams02.mydomain");
    // The shared host has no location variable, so the environment location applies.
    assert_eq!(desired[0].location.as_deref(), Some("ams02"));
}

#[tokio::test]
async fn transport_failures_are_isolated() {
    let inventory = FakeInventory::default()
        .with_host(LOCAL, "alpha", "alpha-1", &local_host("alpha.mydomain"))
        .with_host(LOCAL, "beta", "beta-1", &local_host("beta.mydomain"))
        .with_host(LOCAL, "gamma", "gamma-1", &local_host("gamma.mydomain"));
    let registry = FakeRegistry::default().failing("beta");
    let reconciler = reconciler(&inventory, &registry, &["alpha", "beta", "gamma"]).await;

    let report = reconciler.update_all(&ServiceFilter::default(), false).await;

    assert_eq!(report.services_to_process, vec!["alpha", "beta", "gamma"]);
    assert_eq!(report.added, vec!["alpha", "gamma"]);
    assert_eq!(report.failed, vec!["beta"]);
    assert_eq!(report.by_service["beta"].message.as_deref(), Some("HTTPError"));
    assert!(report.has_failures());
}

#[tokio::test]
async fn update_skips_registered_services_unless_forced() {
    let inventory = FakeInventory::default()
        .with_host(LOCAL, "alpha", "alpha-1", &local_host("alpha.mydomain"))
        .with_host(LOCAL, "beta", "beta-1", &local_host("beta.mydomain"));
    let registry = FakeRegistry::default().with_service("alpha", json!([{ "name": "alpha", "address": "old" }]));
    let reconciler = reconciler(&inventory, &registry, &["alpha", "beta"]).await;

    let report = reconciler.update_all(&ServiceFilter::default(), false).await;
    assert_eq!(report.services_to_process, vec!["beta"]);
    assert!(!report.by_service.contains_key("alpha"));

    let diff = reconciler.diff_all(&ServiceFilter::default()).await;
    assert_eq!(diff.recreate, vec!["alpha"]);
    assert_eq!(diff.add, vec!["beta"]);
}

#[tokio::test]
async fn invalid_port_fails_the_service() {
    let inventory = FakeInventory::default().with_host(
        LOCAL,
        "tes23",
        "host-1",
        &[("SERVER_FQDN", "tes23.mydomain"), ("PORT", "99999"), (ENV_CLEANNAME, LOCAL)],
    );
    let registry = FakeRegistry::default();

    let mut template = variant("tes23");
    template["port"] = json!("{PORT}");
    let catalog = Arc::new(ServiceCatalog::from_json_str(&json!({ "tes23": [template] }).to_string()).unwrap());
    let session = EnvironmentSession::open(&inventory, &registry, LOCAL, SHARED).await.unwrap();
    let reconciler = Reconciler::new(session, catalog);

    let result = reconciler.update("tes23", false).await;
    assert_eq!(result.outcome(), UpdateOutcome::Failed);
    assert_eq!(result.message.as_deref(), Some("invalid new port, got 99999"));
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let names = ["s1", "s2", "s3", "s4", "s5", "s6"];
    let inventory = names.iter().fold(FakeInventory::default(), |inventory, name| {
        inventory.with_host(LOCAL, name, &format!("{}-host", name), &local_host(&format!("{}.mydomain", name)))
    });
    let registry = FakeRegistry::default();
    let reconciler = reconciler(&inventory, &registry, &names).await.with_concurrency(2);

    let report = reconciler.update_all(&ServiceFilter::default(), false).await;

    assert_eq!(report.added.len(), names.len());
    let max = registry.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max in flight was {}", max);
}

#[tokio::test]
async fn unknown_environment_is_fatal() {
    let inventory = FakeInventory::default();
    let registry = FakeRegistry::default();

    let error = EnvironmentSession::open(&inventory, &registry, "NOPE", SHARED)
        .await
        .err()
        .unwrap();
    assert!(matches!(error, FatalError::EnvironmentIdentity { .. }));
}

#[tokio::test]
async fn show_lists_registered_records() {
    let inventory = FakeInventory::default();
    let registry = FakeRegistry::default().with_service(
        "tes23",
        json!([
            { "name": "tes23", "address": "b", "pods": ["p01"] },
            { "name": "tes23", "address": "a", "newModel": true }
        ]),
    );
    let reconciler = reconciler(&inventory, &registry, &["tes23", "other"]).await;

    let shown = reconciler.show_all(&ServiceFilter::default());
    assert!(shown["other"].is_empty());
    let addresses = shown["tes23"].iter().map(|c| c.address.as_deref()).collect::<Vec<_>>();
    assert_eq!(addresses, vec![Some("a"), Some("b")]);
}

#[tokio::test]
async fn deployment_schemes_are_registered() {
    let mut inventory = FakeInventory::default();
    inventory.topology = Topology::from([
        (
            1,
            PopLocation {
                location: "ams02".to_string(),
                server_location: Some("sjc01".to_string()),
            },
        ),
        (
            2,
            PopLocation {
                location: "ams02".to_string(),
                server_location: Some("iad41".to_string()),
            },
        ),
    ]);
    let registry = FakeRegistry::default();
    let reconciler = reconciler(&inventory, &registry, &["tes23"]).await;

    let template = DeploymentSchemeTemplate::from_json_str(
        r#"{
            "all_dc_record": { "entryDc": "*", "activeDc": "*", "priorities": "all" },
            "multipop": {
                "test-1dc": {
                    "name": "test-1dc",
                    "dcPriorities": [ { "entryDc": 1, "activeDc": "*", "priorities": [1] } ]
                }
            }
        }"#,
    )
    .unwrap();

    let report = reconciler.update_deployment_schemes(&template).await;
    assert!(report.status);
    assert_eq!(report.message, vec!["test-1dc"]);

    let registered = registry.schemes.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].dc_priorities[0].priorities, vec!["sjc01", "ams02"]);
}
