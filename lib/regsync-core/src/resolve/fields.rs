use crate::{
    catalog::{expand_placeholders, strip_braces},
    vars::{EnvironmentScope, HostVariableSet},
};

const DEFAULT_PHYSICAL_ENV: &str = "01";

/// Resolves the location field, lowercased.
///
/// Falls back to the environment location when there is no host or the host lacks the variable.
pub fn resolve_location(
    template: Option<&str>, host: Option<&HostVariableSet>, scope: &EnvironmentScope,
) -> Option<String> {
    let template = template.filter(|t| !t.is_empty())?;
    let location = host
        .and_then(|host| host.get(strip_braces(template)))
        .unwrap_or(scope.location());

    Some(location.to_lowercase())
}

/// Resolves the physical environment field as `p<value>`, defaulting to `p01`.
pub fn resolve_physical_env(template: Option<&str>, host: Option<&HostVariableSet>) -> Option<String> {
    let template = template.filter(|t| !t.is_empty())?;
    let value = host
        .and_then(|host| host.get(strip_braces(template)))
        .unwrap_or(DEFAULT_PHYSICAL_ENV);

    Some(format!("p{}", value))
}

/// Resolves the group field by substituting placeholders in place.
///
/// Without a host the template is left untouched.
pub fn resolve_group(template: Option<&str>, host: Option<&HostVariableSet>) -> Option<String> {
    let template = template.filter(|t| !t.is_empty())?;
    match host {
        Some(host) => Some(expand_placeholders(template, |name| host.get(name))),
        None => Some(template.to_string()),
    }
}
