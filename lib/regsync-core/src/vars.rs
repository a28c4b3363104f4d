//! Host variables and the environment scope they are resolved against.

use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};

/// Variable holding the clean name of the environment a host belongs to.
///
/// Always requested from the inventory, since address resolution compares it against the local environment to tell
/// local hosts apart from shared ones.
pub const ENV_CLEANNAME: &str = "ENV.CLEANNAME";

/// Variables of a single host, as reported by the inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct HostVariableSet {
    variables: BTreeMap<String, String>,
}

impl HostVariableSet {
    /// Creates an empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, returning the previous value if any.
    pub fn insert<K, V>(&mut self, name: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.variables.insert(name.into(), value.into())
    }

    /// Returns the value of `name`, if the host defines it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Returns the clean name of the environment this host lives in.
    pub fn environment_cleanname(&self) -> Option<&str> {
        self.get(ENV_CLEANNAME)
    }

    /// Returns `true` if the host has no variables at all.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Keeps only the variables named in `names`.
    pub fn retain_named<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted = names.into_iter().collect::<std::collections::BTreeSet<_>>();
        self.variables.retain(|name, _| wanted.contains(name.as_str()));
    }
}

impl<K, V> FromIterator<(K, V)> for HostVariableSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            variables: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for HostVariableSet {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.into_iter()
    }
}

/// The environment a resolution happens in.
///
/// The local name is kept uppercased and the location lowercased, which is how hosts report them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentScope {
    local_name: String,
    shared_name: String,
    location: String,
}

impl EnvironmentScope {
    pub fn new<L, S, C>(local_name: L, shared_name: S, location: C) -> Self
    where
        L: AsRef<str>,
        S: Into<String>,
        C: AsRef<str>,
    {
        Self {
            local_name: local_name.as_ref().to_uppercase(),
            shared_name: shared_name.into(),
            location: location.as_ref().to_lowercase(),
        }
    }

    /// Name of the environment being reconciled, uppercased.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Name of the environment hosting shared services for the local one.
    pub fn shared_name(&self) -> &str {
        &self.shared_name
    }

    /// Location of the local environment, lowercased.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns `true` if `host` belongs to the local environment.
    ///
    /// The host's `ENV.CLEANNAME` must equal the uppercased local name exactly.
    pub fn is_local(&self, host: &HostVariableSet) -> bool {
        host.environment_cleanname() == Some(self.local_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_normalizes_case() {
        let scope = EnvironmentScope::new("lab01-t01", "AMS02-Shared-Resources", "SJC01");
        assert_eq!(scope.local_name(), "LAB01-T01");
        assert_eq!(scope.shared_name(), "AMS02-Shared-Resources");
        assert_eq!(scope.location(), "sjc01");
    }

    #[test]
    fn local_hosts_are_recognized_by_cleanname() {
        let scope = EnvironmentScope::new("LAB01-T01", "AMS02-Shared-Resources", "sjc01");

        let local = HostVariableSet::from_iter([(ENV_CLEANNAME, "LAB01-T01")]);
        let shared = HostVariableSet::from_iter([(ENV_CLEANNAME, "AMS02-SHARED-RESOURCES")]);

        assert!(scope.is_local(&local));
        assert!(!scope.is_local(&shared));
        assert!(!scope.is_local(&HostVariableSet::new()));
    }

    #[test]
    fn mixed_case_cleanname_is_not_local() {
        let scope = EnvironmentScope::new("lab01-t01", "AMS02-Shared-Resources", "sjc01");

        let mixed = HostVariableSet::from_iter([(ENV_CLEANNAME, "Lab01-T01")]);
        assert!(!scope.is_local(&mixed));

        let upper = HostVariableSet::from_iter([(ENV_CLEANNAME, "LAB01-T01")]);
        assert!(scope.is_local(&upper));
    }

    #[test]
    fn retain_named_drops_unrequested_variables() {
        let mut host = HostVariableSet::from_iter([("A", "1"), ("B", "2"), ("C", "3")]);
        host.retain_named(["A", "C", "D"]);

        assert_eq!(host.get("A"), Some("1"));
        assert_eq!(host.get("B"), None);
        assert_eq!(host.get("C"), Some("3"));
    }
}
