use std::collections::BTreeMap;

use serde::Serialize;

use super::outcome::{DiffOutcome, DiffResult, UpdateOutcome, UpdateResult};
use crate::{normalize::CurrentServiceConfig, scheme::EnvironmentClass};

/// Aggregated results of an update run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UpdateReport {
    pub force_mode: bool,
    pub services_to_process: Vec<String>,
    pub failed: Vec<String>,
    pub added: Vec<String>,
    pub recreated: Vec<String>,
    pub skipped: Vec<String>,
    pub by_service: BTreeMap<String, UpdateResult>,
}

impl UpdateReport {
    /// Builds a report from per-service results, collected in any order.
    pub fn from_results<I>(force_mode: bool, services_to_process: Vec<String>, results: I) -> Self
    where
        I: IntoIterator<Item = (String, UpdateResult)>,
    {
        let mut report = Self {
            force_mode,
            services_to_process,
            ..Default::default()
        };

        report.by_service = results.into_iter().collect();
        for (service, result) in &report.by_service {
            let bucket = match result.outcome() {
                UpdateOutcome::Skipped => &mut report.skipped,
                UpdateOutcome::Failed => &mut report.failed,
                UpdateOutcome::Recreated => &mut report.recreated,
                UpdateOutcome::Added => &mut report.added,
            };
            bucket.push(service.clone());
        }

        report
    }

    /// Returns `true` if any service failed.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Aggregated results of a diff run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiffReport {
    pub fail: Vec<String>,
    pub add: Vec<String>,
    pub recreate: Vec<String>,
    pub skip: Vec<String>,
    pub by_service: BTreeMap<String, DiffResult>,
}

impl DiffReport {
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (String, DiffResult)>,
    {
        let mut report = Self {
            by_service: results.into_iter().collect(),
            ..Default::default()
        };

        for (service, result) in &report.by_service {
            let bucket = match result.outcome() {
                DiffOutcome::Skip => &mut report.skip,
                DiffOutcome::Fail => &mut report.fail,
                DiffOutcome::Add => &mut report.add,
                DiffOutcome::Recreate => &mut report.recreate,
            };
            bucket.push(service.clone());
        }

        report
    }

    /// Returns `true` if some service could not be resolved.
    ///
    /// Pending changes alone do not count as failures.
    pub fn has_failures(&self) -> bool {
        !self.fail.is_empty()
    }

    /// Number of services an update would touch.
    pub fn pending_changes(&self) -> usize {
        self.add.len() + self.recreate.len()
    }
}

/// Registry contents of the selected services.
pub type ShowReport = BTreeMap<String, Vec<CurrentServiceConfig>>;

/// Result of updating the deployment schemes of an environment.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SchemesReport {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_class: Option<EnvironmentClass>,
    /// Names of the schemes sent to the registry.
    pub message: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
