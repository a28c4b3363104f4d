//! Deployment scheme instantiation.
//!
//! Schemes are written against abstract POP indices (`1`, `2`, ...). Instantiating them for an environment replaces
//! each index with the server location of that POP. The environment's topology also decides which family of
//! schemes applies: environments with a single target POP use the `monopop` family, everything else `multipop`.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt as _, Snafu};

use crate::error::{FatalError, InvalidSchemeTemplate, ParseDocument, ReadDocument};

/// Highest POP index that can be targeted by a scheme.
pub const MAX_TARGET_POP: u32 = 2;

/// A POP of an environment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PopLocation {
    /// Location of the POP itself.
    pub location: String,

    /// Location of the servers behind the POP.
    #[serde(default)]
    pub server_location: Option<String>,
}

/// POPs of an environment, keyed by index.
pub type Topology = BTreeMap<u32, PopLocation>;

/// Which family of schemes applies to an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentClass {
    Monopop,
    Multipop,
}

impl EnvironmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monopop => "monopop",
            Self::Multipop => "multipop",
        }
    }
}

/// What scheme instantiation needs to know about a topology.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologySummary {
    /// Server location of each POP, keeping only the first POP for each distinct location.
    pub unique_pops: BTreeMap<u32, String>,

    /// Every non-empty server location.
    pub server_locations: BTreeSet<String>,

    /// Every non-empty POP location.
    pub pop_locations: BTreeSet<String>,
}

impl TopologySummary {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut summary = Self::default();

        for (index, pop) in topology {
            if !pop.location.is_empty() {
                summary.pop_locations.insert(pop.location.clone());
            }

            let Some(server_location) = pop.server_location.as_deref().filter(|l| !l.is_empty()) else {
                continue;
            };

            if summary.server_locations.insert(server_location.to_string()) {
                summary.unique_pops.insert(*index, server_location.to_string());
            }
        }

        summary
    }

    /// The POPs schemes may refer to: indices up to [`MAX_TARGET_POP`].
    pub fn target_pops(&self) -> BTreeMap<u32, &str> {
        self.unique_pops
            .iter()
            .filter(|(index, location)| **index <= MAX_TARGET_POP && !location.is_empty())
            .map(|(index, location)| (*index, location.as_str()))
            .collect()
    }

    pub fn environment_class(&self) -> EnvironmentClass {
        if self.target_pops().len() == 1 {
            EnvironmentClass::Monopop
        } else {
            EnvironmentClass::Multipop
        }
    }

    /// Every server and POP location, sorted.
    pub fn all_locations(&self) -> Vec<String> {
        self.server_locations
            .union(&self.pop_locations)
            .cloned()
            .collect()
    }
}

/// A data center reference in a scheme template: a POP index or a literal such as `*`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DcRef {
    Pop(u32),
    Literal(String),
}

/// Priorities in a scheme template: POP indices, or a keyword standing for every location.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PriorityTemplate {
    Pops(Vec<u32>),
    Keyword(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DcPriorityTemplate {
    pub entry_dc: DcRef,
    pub active_dc: DcRef,
    pub priorities: PriorityTemplate,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeTemplate {
    pub name: String,
    pub dc_priorities: Vec<DcPriorityTemplate>,

    /// Any other scheme attributes, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The deployment scheme template document.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DeploymentSchemeTemplate {
    /// Catch-all record appended to every scheme.
    pub all_dc_record: DcPriorityTemplate,

    #[serde(default)]
    pub monopop: IndexMap<String, SchemeTemplate>,

    #[serde(default)]
    pub multipop: IndexMap<String, SchemeTemplate>,
}

impl DeploymentSchemeTemplate {
    /// Parses a template from a JSON document.
    ///
    /// # Errors
    ///
    /// If the document is not valid JSON, does not match the template shape, or defines no scheme at all, an error is
    /// returned.
    pub fn from_json_str(document: &str) -> Result<Self, FatalError> {
        let template: Self = serde_json::from_str(document).context(ParseDocument {
            what: "deployment scheme template",
        })?;

        if template.monopop.is_empty() && template.multipop.is_empty() {
            return InvalidSchemeTemplate {
                reason: "no monopop or multipop schemes defined",
            }
            .fail();
        }

        Ok(template)
    }

    /// Reads and parses a template from a JSON file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or its contents are not a valid template, an error is returned.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FatalError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).context(ReadDocument {
            what: "deployment scheme template",
            path,
        })?;
        Self::from_json_str(&document)
    }

    pub fn schemes_for(&self, class: EnvironmentClass) -> &IndexMap<String, SchemeTemplate> {
        match class {
            EnvironmentClass::Monopop => &self.monopop,
            EnvironmentClass::Multipop => &self.multipop,
        }
    }
}

/// A scheme template refers to a POP the environment does not have.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SchemeError {
    #[snafu(display("scheme '{}' refers to POP {} which is not a target POP of this environment", scheme, index))]
    UnknownPop { scheme: String, index: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DcPriority {
    pub entry_dc: String,
    pub active_dc: String,
    pub priorities: Vec<String>,
}

/// A deployment scheme instantiated for one environment.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDeploymentScheme {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub dc_priorities: Vec<DcPriority>,
}

/// Instantiates the scheme family matching `summary` from `template`.
///
/// Each record has its POP indices replaced by server locations. POP locations missing from a record's priorities are
/// appended to them, in sorted order. Every scheme ends with the catch-all record, whose priorities are all known
/// locations.
///
/// # Errors
///
/// If a record refers to a POP index that is not among the environment's target POPs, an error is returned.
pub fn resolve_schemes(
    summary: &TopologySummary, template: &DeploymentSchemeTemplate,
) -> Result<Vec<ResolvedDeploymentScheme>, SchemeError> {
    let targets = summary.target_pops();
    let all_locations = summary.all_locations();

    let resolve_ref = |scheme: &str, dc: &DcRef| -> Result<String, SchemeError> {
        match dc {
            DcRef::Literal(literal) => Ok(literal.clone()),
            DcRef::Pop(index) => targets.get(index).map(|l| l.to_string()).ok_or_else(|| {
                UnknownPop {
                    scheme,
                    index: *index,
                }
                .build()
            }),
        }
    };

    let catch_all = DcPriority {
        entry_dc: resolve_ref("all_dc_record", &template.all_dc_record.entry_dc)?,
        active_dc: resolve_ref("all_dc_record", &template.all_dc_record.active_dc)?,
        priorities: all_locations.clone(),
    };

    let mut resolved = Vec::new();
    for scheme in template.schemes_for(summary.environment_class()).values() {
        let mut dc_priorities = Vec::with_capacity(scheme.dc_priorities.len() + 1);

        for record in &scheme.dc_priorities {
            let mut priorities = match &record.priorities {
                PriorityTemplate::Pops(indices) => indices
                    .iter()
                    .map(|index| resolve_ref(&scheme.name, &DcRef::Pop(*index)))
                    .collect::<Result<Vec<_>, _>>()?,
                PriorityTemplate::Keyword(_) => all_locations.clone(),
            };

            for location in &summary.pop_locations {
                if !priorities.contains(location) {
                    priorities.push(location.clone());
                }
            }

            dc_priorities.push(DcPriority {
                entry_dc: resolve_ref(&scheme.name, &record.entry_dc)?,
                active_dc: resolve_ref(&scheme.name, &record.active_dc)?,
                priorities,
            });
        }

        dc_priorities.push(catch_all.clone());
        resolved.push(ResolvedDeploymentScheme {
            name: scheme.name.clone(),
            extra: scheme.extra.clone(),
            dc_priorities,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const TEMPLATE: &str = r#"{
        "all_dc_record": { "entryDc": "*", "activeDc": "*", "priorities": "all" },
        "monopop": {
            "test-mono": {
                "name": "test-mono",
                "podRequired": true,
                "dcPriorities": [ { "entryDc": "*", "activeDc": 1, "priorities": [1] } ]
            }
        },
        "multipop": {
            "test-1dc": {
                "name": "test-1dc",
                "podRequired": false,
                "dcPriorities": [
                    { "entryDc": 1, "activeDc": "*", "priorities": [1] },
                    { "entryDc": 2, "activeDc": "*", "priorities": [2] }
                ]
            },
            "test-2dc": {
                "name": "test-2dc",
                "podRequired": false,
                "dcPriorities": [
                    { "entryDc": 1, "activeDc": 1, "priorities": [1, 2] },
                    { "entryDc": 2, "activeDc": 2, "priorities": [2, 1] }
                ]
            }
        }
    }"#;

    fn pop(location: &str, server_location: &str) -> PopLocation {
        PopLocation {
            location: location.to_string(),
            server_location: Some(server_location.to_string()),
        }
    }

    fn two_pops() -> Topology {
        Topology::from([(1, pop("ams02", "sjc01")), (2, pop("ams02", "iad41"))])
    }

    #[test]
    fn summary_of_two_pop_environment() {
        let summary = TopologySummary::from_topology(&two_pops());

        assert_eq!(
            summary.unique_pops,
            BTreeMap::from([(1, "sjc01".to_string()), (2, "iad41".to_string())])
        );
        assert_eq!(summary.environment_class(), EnvironmentClass::Multipop);
        assert_eq!(summary.all_locations(), vec!["ams02", "iad41", "sjc01"]);
    }

    #[test]
    fn shared_server_location_keeps_first_pop() {
        let topology = Topology::from([(1, pop("ams02", "sjc01")), (2, pop("lhr01", "sjc01"))]);
        let summary = TopologySummary::from_topology(&topology);

        assert_eq!(summary.unique_pops, BTreeMap::from([(1, "sjc01".to_string())]));
        assert_eq!(summary.environment_class(), EnvironmentClass::Monopop);
    }

    #[test]
    fn pops_beyond_two_are_not_targets() {
        let topology = Topology::from([(1, pop("ams02", "sjc01")), (3, pop("ams02", "iad41"))]);
        let summary = TopologySummary::from_topology(&topology);

        assert_eq!(summary.target_pops(), BTreeMap::from([(1, "sjc01")]));
        assert_eq!(summary.environment_class(), EnvironmentClass::Monopop);
    }

    #[test]
    fn empty_topology_is_multipop() {
        let summary = TopologySummary::from_topology(&Topology::new());
        assert_eq!(summary.environment_class(), EnvironmentClass::Multipop);
    }

    #[test]
    fn multipop_schemes_are_instantiated() {
        let template = DeploymentSchemeTemplate::from_json_str(TEMPLATE).unwrap();
        let summary = TopologySummary::from_topology(&two_pops());
        let schemes = resolve_schemes(&summary, &template).unwrap();

        let catch_all = json!({ "entryDc": "*", "activeDc": "*", "priorities": ["ams02", "iad41", "sjc01"] });
        similar_asserts::assert_eq!(
            serde_json::to_value(&schemes).unwrap(),
            json!([
                {
                    "name": "test-1dc",
                    "podRequired": false,
                    "dcPriorities": [
                        { "entryDc": "sjc01", "activeDc": "*", "priorities": ["sjc01", "ams02"] },
                        { "entryDc": "iad41", "activeDc": "*", "priorities": ["iad41", "ams02"] },
                        catch_all
                    ]
                },
                {
                    "name": "test-2dc",
                    "podRequired": false,
                    "dcPriorities": [
                        { "entryDc": "sjc01", "activeDc": "sjc01", "priorities": ["sjc01", "iad41", "ams02"] },
                        { "entryDc": "iad41", "activeDc": "iad41", "priorities": ["iad41", "sjc01", "ams02"] },
                        catch_all
                    ]
                }
            ])
        );
    }

    #[test]
    fn monopop_schemes_are_instantiated() {
        let template = DeploymentSchemeTemplate::from_json_str(TEMPLATE).unwrap();
        let topology = Topology::from([(1, pop("lhr01", "lhr01"))]);
        let schemes = resolve_schemes(&TopologySummary::from_topology(&topology), &template).unwrap();

        assert_eq!(schemes.len(), 1);
        assert_eq!(schemes[0].name, "test-mono");
        assert_eq!(
            schemes[0].dc_priorities,
            vec![
                DcPriority {
                    entry_dc: "*".to_string(),
                    active_dc: "lhr01".to_string(),
                    priorities: vec!["lhr01".to_string()],
                },
                DcPriority {
                    entry_dc: "*".to_string(),
                    active_dc: "*".to_string(),
                    priorities: vec!["lhr01".to_string()],
                },
            ]
        );
    }

    #[test]
    fn unknown_pop_is_an_error() {
        let document = TEMPLATE.replace(r#""activeDc": 1, "priorities": [1]"#, r#""activeDc": 1, "priorities": [2]"#);
        let template = DeploymentSchemeTemplate::from_json_str(&document).unwrap();
        let topology = Topology::from([(1, pop("lhr01", "lhr01"))]);

        let error = resolve_schemes(&TopologySummary::from_topology(&topology), &template).unwrap_err();
        assert_eq!(
            error.to_string(),
            "scheme 'test-mono' refers to POP 2 which is not a target POP of this environment"
        );
    }

    #[test]
    fn template_without_schemes_is_rejected() {
        let error = DeploymentSchemeTemplate::from_json_str(
            r#"{ "all_dc_record": { "entryDc": "*", "activeDc": "*", "priorities": "all" } }"#,
        )
        .unwrap_err();

        assert!(matches!(error, FatalError::InvalidSchemeTemplate { .. }));
    }
}
