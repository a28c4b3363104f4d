//! Layered, immutable configuration.
//!
//! Configuration is assembled once at startup from files and environment variables, and then handed around explicitly
//! as a [`GenericConfiguration`]. Nothing here is global, and nothing changes after loading.
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider,
};
use regsync_error::GenericError;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

mod provider;
use self::provider::FileSnapshotProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text listing the keys that would satisfy the lookup.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field had a different data type than expected.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Any other configuration failure: unreadable file, malformed document, and so on.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        from_figment_error(&HashSet::new(), e)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct EnvironmentLookup {
    // Uppercased, with a trailing underscore.
    prefix: String,
}

impl EnvironmentLookup {
    fn variable_for(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace('.', "_").to_uppercase())
    }
}

struct BoxedProvider(Box<dyn Provider + Send + Sync>);

impl Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// Builds a configuration from multiple sources.
///
/// Sources added later take precedence over sources added earlier. A typical setup is defaults, then a configuration
/// file, then environment variables.
///
/// # Supported sources
///
/// - serializable defaults ([`with_defaults`][Self::with_defaults])
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
#[derive(Default)]
pub struct ConfigurationLoader {
    environment_lookups: HashSet<EnvironmentLookup>,
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    /// Adds a set of default values, serialized from `defaults`.
    pub fn with_defaults<T>(mut self, defaults: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.providers
            .push(BoxedProvider(Box::new(Serialized::defaults(defaults))));
        self
    }

    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileSnapshotProvider::from_yaml(&path).map_err(GenericError::from).context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(provider)));
        Ok(self)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    pub fn try_from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match FileSnapshotProvider::from_yaml(&path) {
            Ok(provider) => self.providers.push(BoxedProvider(Box::new(provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().display(), "Unable to read YAML configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileSnapshotProvider::from_json(&path).map_err(GenericError::from).context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(provider)));
        Ok(self)
    }

    /// Attempts to load the given JSON configuration file, ignoring any errors.
    pub fn try_from_json<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match FileSnapshotProvider::from_json(&path) {
            Ok(provider) => self.providers.push(BoxedProvider(Box::new(provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().display(), "Unable to read JSON configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// An underscore is appended to the prefix if it does not already end with one, so a prefix of `regsync` matches
    /// `REGSYNC_CONCURRENCY`. Matching is case-insensitive. The environment is read once, when this method is called.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        // `Env` is neither `Send` nor `Sync`, so take a snapshot of what it sees right now.
        let values = Env::prefixed(&prefix).data()?;
        if let Some(dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(dict.clone()))));
            self.environment_lookups.insert(EnvironmentLookup { prefix });
        }
        Ok(self)
    }

    fn merged(&self) -> Figment {
        self.providers
            .iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider))
    }

    /// Consumes the loader, deserializing the merged configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<'a, T>(self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.merged()
            .extract()
            .map_err(|e| from_figment_error(&self.environment_lookups, e))
    }

    /// Consumes the loader and wraps the merged configuration for keyed queries.
    pub fn into_generic(self) -> GenericConfiguration {
        let figment = self.merged();
        GenericConfiguration {
            inner: Arc::new(Inner {
                figment,
                environment_lookups: self.environment_lookups,
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    figment: Figment,
    environment_lookups: HashSet<EnvironmentLookup>,
}

/// A merged, read-only configuration.
///
/// Values are queried by key in the form `a.b.c`, where periods indicate nesting. Cloning is cheap, and every clone
/// sees the same data.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    fn get<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.inner.figment.extract_inner(key) {
            Ok(value) => Ok(value),
            Err(e) if matches!(e.kind, Kind::MissingField(_)) => {
                // Environment variables can't express nesting, so `registry.url` may only exist as `registry_url`.
                let fallback_key = key.replace('.', "_");
                self.inner
                    .figment
                    .extract_inner(&fallback_key)
                    .map_err(|fallback_e| from_figment_error(&self.inner.environment_lookups, fallback_e))
            }
            Err(e) => Err(from_figment_error(&self.inner.environment_lookups, e)),
        }
    }

    /// Gets a configuration value by key.
    ///
    /// # Errors
    ///
    /// If the key does not exist, or the value could not be deserialized into `T`, an error is returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.get(key)
    }

    /// Gets a configuration value by key, or `T::default()` if it is missing or could not be deserialized.
    pub fn get_typed_or_default<'a, T>(&self, key: &str) -> T
    where
        T: Default + Deserialize<'a>,
    {
        self.get(key).unwrap_or_default()
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// # Errors
    ///
    /// If the value exists but could not be deserialized into `T`, an error is returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deserializes the entire configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error is returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner
            .figment
            .extract()
            .map_err(|e| from_figment_error(&self.inner.environment_lookups, e))
    }
}

fn from_figment_error(lookups: &HashSet<EnvironmentLookup>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let mut valid_keys = lookups.iter().map(|l| l.variable_for(&field)).collect::<Vec<_>>();
            valid_keys.sort();
            valid_keys.insert(0, field.to_string());

            let help_text = format!("Try setting `{}`.", valid_keys.join("` or `"));
            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual_ty.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}
