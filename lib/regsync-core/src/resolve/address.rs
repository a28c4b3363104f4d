use std::collections::BTreeMap;

use crate::{
    catalog::{strip_braces, AddressTemplate, PortTemplate, DEFAULT_KEY},
    vars::{EnvironmentScope, HostVariableSet},
};

/// Port used when a templated port does not resolve to digits.
pub const DEFAULT_PORT: u16 = 80;

/// A port as it comes out of resolution, before validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedPort {
    Valid(u16),
    Invalid(String),
}

/// Resolves the address of a variant against one host.
///
/// The first applicable rule wins:
///
/// 1. a host in the local environment: substitute from its variables
/// 2. `shared_by_location`: look up the environment location, else `default`
/// 3. `shared_by_env`: look up the shared environment name, else `default`
/// 4. any other host: substitute from its variables
/// 5. no host: the default template with its braces stripped
///
/// The result is reduced to a bare host name: everything up to the last `//` and from the first `:` is dropped. When
/// a placeholder cannot be substituted the template is returned as-is, which later fails validation.
pub fn resolve_address(template: &AddressTemplate, host: Option<&HostVariableSet>, scope: &EnvironmentScope) -> String {
    let raw = match host {
        Some(host) if scope.is_local(host) => substitute(&template.default, host),
        _ => {
            if let Some(by_location) = non_empty(&template.shared_by_location) {
                shared_lookup(by_location, scope.location(), &template.default)
            } else if let Some(by_env) = non_empty(&template.shared_by_env) {
                shared_lookup(by_env, scope.shared_name(), &template.default)
            } else if let Some(host) = host {
                substitute(&template.default, host)
            } else {
                strip_braces(&template.default).to_string()
            }
        }
    };

    bare_host(&raw).to_string()
}

/// Resolves the port of a variant against one host.
///
/// Literal ports are taken as-is. A placeholder is looked up on the host and the text after its last `:` is used, so
/// variables holding `host:port` pairs work too. If that text is not all digits, the port falls back to
/// [`DEFAULT_PORT`].
pub fn resolve_port(template: &PortTemplate, host: Option<&HostVariableSet>) -> ResolvedPort {
    match template {
        PortTemplate::Number(port) => match u16::try_from(*port) {
            Ok(port) => ResolvedPort::Valid(port),
            Err(_) => ResolvedPort::Invalid(port.to_string()),
        },
        PortTemplate::Placeholder(placeholder) if placeholder.contains('{') => {
            let value = host.and_then(|host| host.get(strip_braces(placeholder))).unwrap_or_default();
            let digits = value.rsplit(':').next().unwrap_or_default();

            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return ResolvedPort::Valid(DEFAULT_PORT);
            }

            match digits.parse::<u16>() {
                Ok(port) => ResolvedPort::Valid(port),
                Err(_) => ResolvedPort::Invalid(digits.to_string()),
            }
        }
        PortTemplate::Placeholder(literal) => ResolvedPort::Invalid(literal.clone()),
    }
}

/// Strips any scheme and port from an address.
pub fn bare_host(address: &str) -> &str {
    let without_scheme = address.rsplit_once("//").map_or(address, |(_, rest)| rest);
    without_scheme.split_once(':').map_or(without_scheme, |(host, _)| host)
}

fn non_empty<V>(map: &Option<BTreeMap<String, V>>) -> Option<&BTreeMap<String, V>> {
    map.as_ref().filter(|map| !map.is_empty())
}

fn shared_lookup(map: &BTreeMap<String, String>, key: &str, fallback: &str) -> String {
    map.get(key)
        .or_else(|| map.get(DEFAULT_KEY))
        .map_or_else(|| fallback.to_string(), Clone::clone)
}

fn substitute(template: &str, host: &HostVariableSet) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    match host.get(strip_braces(template)) {
        Some(value) => value.to_string(),
        None => template.to_string(),
    }
}
