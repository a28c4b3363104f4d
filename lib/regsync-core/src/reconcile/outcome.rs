use serde::Serialize;

use crate::{
    diff::ConfigDiff, normalize::CurrentServiceConfig, reconcile::ConfigError, resolve::ResolvedServiceConfig,
};

pub(crate) const MESSAGE_NO_CHANGES: &str = "no changes, nothing to update";
pub(crate) const MESSAGE_ALREADY_REGISTERED: &str = "already registered, use force to recreate";
pub(crate) const MESSAGE_ADDED: &str = "added";
pub(crate) const MESSAGE_RECREATED: &str = "recreated";
pub(crate) const MESSAGE_TRANSPORT: &str = "HTTPError";

/// Why a service needs no registry call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The service has no hosts in this environment. Carries the resolver's message.
    NotPresent(String),

    /// Desired and current configs are equal.
    NoChanges,

    /// The service is registered and differs, but recreating it was not requested.
    AlreadyRegistered,
}

/// What to do with one service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    Skip(SkipReason),
    Fail(String),
    Add,
    Recreate,
}

impl Plan {
    /// Decides what to do with a service. Conditions are checked in order and the first match wins.
    pub fn decide(
        desired: Result<&[ResolvedServiceConfig], &ConfigError>, diff: &ConfigDiff, registered: bool, force: bool,
    ) -> Self {
        match desired {
            Err(e) if e.is_not_present() => Self::Skip(SkipReason::NotPresent(e.to_string())),
            Err(e) => Self::Fail(e.to_string()),
            Ok(_) if diff.is_empty() => Self::Skip(SkipReason::NoChanges),
            Ok(_) if !registered => Self::Add,
            Ok(_) if force => Self::Recreate,
            Ok(_) => Self::Skip(SkipReason::AlreadyRegistered),
        }
    }
}

/// Outcome of updating a single service.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub status: bool,
    pub message: Option<String>,
    pub updated: bool,
    pub old_deleted: bool,
    pub config_diff: ConfigDiff,
    #[serde(skip)]
    pub(crate) not_present: bool,
}

/// How an update result is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOutcome {
    Skipped,
    Failed,
    Recreated,
    Added,
}

impl UpdateResult {
    pub(crate) fn skipped(reason: SkipReason, config_diff: ConfigDiff) -> Self {
        let (message, not_present) = match reason {
            SkipReason::NotPresent(message) => (message, true),
            SkipReason::NoChanges => (MESSAGE_NO_CHANGES.to_string(), false),
            SkipReason::AlreadyRegistered => (MESSAGE_ALREADY_REGISTERED.to_string(), false),
        };

        Self {
            // A service without hosts is reported with a false status, but classified as skipped.
            status: !not_present,
            message: Some(message),
            config_diff,
            not_present,
            ..Default::default()
        }
    }

    pub(crate) fn failed<M: Into<String>>(message: M, config_diff: ConfigDiff) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            config_diff,
            ..Default::default()
        }
    }

    /// Returns `true` if the service had no hosts in the environment.
    pub fn is_not_present(&self) -> bool {
        self.not_present
    }

    /// Classifies this result. Conditions are checked in order and the first match wins.
    pub fn outcome(&self) -> UpdateOutcome {
        if !self.status && self.not_present {
            UpdateOutcome::Skipped
        } else if !self.status {
            UpdateOutcome::Failed
        } else if !self.updated {
            UpdateOutcome::Skipped
        } else if self.old_deleted {
            UpdateOutcome::Recreated
        } else {
            UpdateOutcome::Added
        }
    }
}

/// Outcome of diffing a single service.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub status: bool,
    pub message: String,
    pub current_config: Vec<CurrentServiceConfig>,
    pub new_config: Vec<ResolvedServiceConfig>,
    pub config_diff: ConfigDiff,
    #[serde(skip)]
    pub(crate) not_present: bool,
    #[serde(skip)]
    pub(crate) registered: bool,
}

/// What a diff says an update would do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOutcome {
    Skip,
    Fail,
    Add,
    Recreate,
}

impl DiffResult {
    /// Classifies this result. Conditions are checked in order and the first match wins.
    pub fn outcome(&self) -> DiffOutcome {
        if !self.status && self.not_present {
            DiffOutcome::Skip
        } else if !self.status {
            DiffOutcome::Fail
        } else if self.config_diff.is_empty() {
            DiffOutcome::Skip
        } else if !self.registered {
            DiffOutcome::Add
        } else {
            DiffOutcome::Recreate
        }
    }
}
