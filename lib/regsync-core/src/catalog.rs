//! The service catalog.
//!
//! The catalog maps a service name to one or more templated variants describing how that service should be
//! registered. Template strings may contain `{NAME}` placeholders which are filled in from host variables at
//! resolution time.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;

use crate::{
    error::{FatalError, InvalidCatalog, ParseDocument, ReadDocument},
    vars::ENV_CLEANNAME,
};

/// Key every shared address map must carry, used when the lookup key is absent.
pub const DEFAULT_KEY: &str = "default";

/// Returns the name inside the first `{...}` placeholder of `value`.
pub fn placeholder_name(value: &str) -> Option<&str> {
    let start = value.find('{')?;
    let rest = &value[start + 1..];
    let end = rest.find('}')?;
    Some(&rest[..end])
}

/// Strips any leading and trailing braces from `value`.
///
/// Turns a whole-value placeholder such as `{SERVER_FQDN}` into the bare variable name.
pub fn strip_braces(value: &str) -> &str {
    value.trim_matches(|c| c == '{' || c == '}')
}

/// Replaces every `{NAME}` placeholder in `template` using `lookup`.
///
/// Placeholders `lookup` cannot resolve are replaced with an empty string. An unterminated `{` is kept verbatim.
pub fn expand_placeholders<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };

        expanded.push_str(&rest[..start]);
        let name = &rest[start + 1..start + 1 + len];
        expanded.push_str(lookup(name).unwrap_or_default());
        rest = &rest[start + len + 2..];
    }

    expanded.push_str(rest);
    expanded
}

/// Address template of a service variant.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AddressTemplate {
    /// Address used when no shared override applies, usually a single placeholder.
    pub default: String,

    /// Literal addresses keyed by environment location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_by_location: Option<BTreeMap<String, String>>,

    /// Literal addresses keyed by shared environment name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_by_env: Option<BTreeMap<String, String>>,

    /// Inventory role to discover hosts by, when it differs from the service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_service: Option<String>,
}

/// Port template of a service variant: either a literal port or a placeholder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortTemplate {
    Number(i64),
    Placeholder(String),
}

/// A single templated registry entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceVariant {
    pub service_name: String,
    pub service_version: String,
    pub service_interface: String,
    pub deployment_scheme: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub physical_env: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub group: Option<String>,
    pub address: AddressTemplate,
    pub port: PortTemplate,
}

impl ServiceVariant {
    fn templated_fields(&self) -> impl Iterator<Item = &str> {
        let port = match &self.port {
            PortTemplate::Placeholder(port) => Some(port.as_str()),
            PortTemplate::Number(_) => None,
        };

        std::iter::once(self.address.default.as_str())
            .chain(port)
            .chain(self.location.as_deref())
            .chain(self.physical_env.as_deref())
            .chain(self.group.as_deref())
    }
}

/// All variants registered under one service name.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ServiceTemplate {
    variants: Vec<ServiceVariant>,
}

impl ServiceTemplate {
    pub fn new(variants: Vec<ServiceVariant>) -> Self {
        Self { variants }
    }

    pub fn variants(&self) -> &[ServiceVariant] {
        &self.variants
    }

    /// Inventory role used for host discovery, taken from the first variant.
    pub fn source_service(&self) -> Option<&str> {
        self.variants
            .first()
            .and_then(|variant| variant.address.source_service.as_deref())
    }

    /// Returns `true` if any variant discovers its hosts through `source`.
    pub fn is_sourced_from(&self, source: &str) -> bool {
        self.variants
            .iter()
            .any(|variant| variant.address.source_service.as_deref() == Some(source))
    }
}

/// The full catalog of services, validated at load time.
#[derive(Clone, Debug, Default)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceTemplate>,
    required_variables: BTreeSet<String>,
}

impl ServiceCatalog {
    /// Builds a catalog from already-parsed templates.
    ///
    /// # Errors
    ///
    /// If any template is malformed, an error is returned naming the service and the problem.
    pub fn new(services: BTreeMap<String, ServiceTemplate>) -> Result<Self, FatalError> {
        for (name, template) in &services {
            validate_template(name, template).map_err(|reason| InvalidCatalog { reason }.build())?;
        }

        let mut required_variables = BTreeSet::from([ENV_CLEANNAME.to_string()]);
        for variant in services.values().flat_map(ServiceTemplate::variants) {
            required_variables.extend(
                variant
                    .templated_fields()
                    .filter(|field| field.contains('{'))
                    .filter_map(placeholder_name)
                    .map(str::to_string),
            );
        }

        Ok(Self {
            services,
            required_variables,
        })
    }

    /// Parses a catalog from a JSON document.
    ///
    /// # Errors
    ///
    /// If the document is not valid JSON, does not match the catalog shape, or fails validation, an error is returned.
    pub fn from_json_str(document: &str) -> Result<Self, FatalError> {
        let services = serde_json::from_str(document).context(ParseDocument { what: "service catalog" })?;
        Self::new(services)
    }

    /// Reads and parses a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or its contents are not a valid catalog, an error is returned.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FatalError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).context(ReadDocument {
            what: "service catalog",
            path,
        })?;
        Self::from_json_str(&document)
    }

    pub fn get(&self, service: &str) -> Option<&ServiceTemplate> {
        self.services.get(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Service names in sorted order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceTemplate)> {
        self.services.iter().map(|(name, template)| (name.as_str(), template))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Every variable name referenced anywhere in the catalog, plus [`ENV_CLEANNAME`].
    ///
    /// This is both the set of variables fetched for each host and the set of values that, if they come back as a
    /// resolved address, mean the address never resolved.
    pub fn required_variables(&self) -> &BTreeSet<String> {
        &self.required_variables
    }
}

fn validate_template(name: &str, template: &ServiceTemplate) -> Result<(), String> {
    if template.variants.is_empty() {
        return Err(format!("service '{}' has no variants", name));
    }

    for variant in &template.variants {
        if variant.service_name.is_empty() {
            return Err(format!("service '{}' has a variant with an empty serviceName", name));
        }

        if variant.address.default.is_empty() {
            return Err(format!("service '{}' has an empty default address", name));
        }

        let shared_maps = [
            ("shared_by_location", &variant.address.shared_by_location),
            ("shared_by_env", &variant.address.shared_by_env),
        ];
        for (field, map) in shared_maps {
            if let Some(map) = map {
                if !map.is_empty() && !map.contains_key(DEFAULT_KEY) {
                    return Err(format!(
                        "service '{}': {} has no '{}' entry",
                        name, field, DEFAULT_KEY
                    ));
                }
            }
        }

        match &variant.port {
            PortTemplate::Number(port) if !(0..=i64::from(u16::MAX)).contains(port) => {
                return Err(format!("service '{}': port {} is out of range", name, port));
            }
            PortTemplate::Placeholder(port) if !is_single_placeholder(port) => {
                return Err(format!(
                    "service '{}': port '{}' must be an integer or a single placeholder",
                    name, port
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

fn is_single_placeholder(value: &str) -> bool {
    value
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .is_some_and(|inner| !inner.is_empty() && !inner.contains(['{', '}']))
}
