//! Selection of the services a run operates on.

use crate::{catalog::ServiceCatalog, normalize::CurrentRegistry};

/// What a run intends to do with the selected services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Register services. Unless `force` is set, services already in the registry are left out.
    Update { force: bool },

    /// Compare every catalog service with the registry.
    Diff,

    /// Display what the registry holds.
    Show,
}

/// User supplied restrictions on the services to process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    only: Vec<String>,
    group: Vec<String>,
    exclude: Vec<String>,
}

impl ServiceFilter {
    /// Builds a filter from comma-separated lists, where an empty string means no restriction.
    pub fn from_lists(only: &str, group: &str, exclude: &str) -> Self {
        Self {
            only: split_list(only),
            group: split_list(group),
            exclude: split_list(exclude),
        }
    }

    /// Keeps only the named services.
    pub fn with_only<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = services.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps only the named services and those sourcing their hosts from them.
    pub fn with_group<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group = services.into_iter().map(Into::into).collect();
        self
    }

    /// Drops the named services.
    pub fn with_exclude<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = services.into_iter().map(Into::into).collect();
        self
    }

    /// Applies the first non-empty restriction among `only`, `group` and `exclude`.
    fn allows(&self, catalog: &ServiceCatalog, service: &str) -> bool {
        if !self.only.is_empty() {
            self.only.iter().any(|s| s == service)
        } else if !self.group.is_empty() {
            self.group.iter().any(|member| {
                member == service || catalog.get(service).is_some_and(|template| template.is_sourced_from(member))
            })
        } else {
            !self.exclude.iter().any(|s| s == service)
        }
    }
}

/// Splits a comma-separated list, ignoring blank entries.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Picks the catalog services to process, in sorted order.
///
/// `Show` considers every catalog service. `Diff` does too, since a diff is meant to reveal what a forced update would
/// change. `Update` without `force` skips services the registry already has.
pub fn select_candidates(
    catalog: &ServiceCatalog, current: &CurrentRegistry, filter: &ServiceFilter, mode: RunMode,
) -> Vec<String> {
    let force = match mode {
        RunMode::Show => {
            return catalog.service_names().map(str::to_string).collect();
        }
        RunMode::Diff => true,
        RunMode::Update { force } => force,
    };

    catalog
        .service_names()
        .filter(|service| force || !current.contains(service))
        .filter(|service| filter.allows(catalog, service))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::normalize::NativeServiceRecord;

    fn catalog() -> ServiceCatalog {
        let variant = |name: &str, source: Option<&str>| {
            serde_json::json!({
                "serviceName": name,
                "serviceVersion": "v1",
                "serviceInterface": "http",
                "deploymentScheme": "default",
                "address": { "default": "{SERVER_FQDN}", "source_service": source },
                "port": 80
            })
        };

        let document = serde_json::json!({
            "service1": [variant("service1", None)],
            "service2": [variant("service2", Some("service1"))],
            "service3": [variant("service3", None)],
            "service4": [variant("service4", None)],
        });
        ServiceCatalog::from_json_str(&document.to_string()).unwrap()
    }

    fn current() -> CurrentRegistry {
        CurrentRegistry::new(BTreeMap::from([
            ("service1".to_string(), vec![NativeServiceRecord::default()]),
            ("service2".to_string(), vec![]),
        ]))
    }

    fn select(filter: &ServiceFilter, mode: RunMode) -> Vec<String> {
        select_candidates(&catalog(), &current(), filter, mode)
    }

    #[test]
    fn update_skips_registered_services() {
        let selected = select(&ServiceFilter::default(), RunMode::Update { force: false });
        assert_eq!(selected, vec!["service3", "service4"]);
    }

    #[test]
    fn forced_update_and_diff_consider_everything() {
        let all = vec!["service1", "service2", "service3", "service4"];
        assert_eq!(select(&ServiceFilter::default(), RunMode::Update { force: true }), all);
        assert_eq!(select(&ServiceFilter::default(), RunMode::Diff), all);
    }

    #[test]
    fn show_ignores_filters() {
        let filter = ServiceFilter::default().with_only(["service3"]);
        assert_eq!(select(&filter, RunMode::Show).len(), 4);
    }

    #[test]
    fn group_includes_services_sourced_from_members() {
        let filter = ServiceFilter::default().with_group(["service1"]);
        assert_eq!(select(&filter, RunMode::Diff), vec!["service1", "service2"]);
    }

    #[test]
    fn only_takes_precedence_over_exclude() {
        let filter = ServiceFilter::from_lists("service1,service3, service4", "", "service4");
        assert_eq!(
            select(&filter, RunMode::Update { force: true }),
            vec!["service1", "service3", "service4"]
        );
    }

    #[test]
    fn exclude_drops_services() {
        let filter = ServiceFilter::from_lists("", "", "service1,service4");
        assert_eq!(select(&filter, RunMode::Diff), vec!["service2", "service3"]);
    }

    #[test]
    fn blank_list_entries_are_ignored() {
        assert_eq!(split_list(""), Vec::<String>::new());
        assert_eq!(split_list("a,,b ,"), vec!["a", "b"]);
    }
}
