use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use backon::Retryable as _;
use http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use regsync_config::GenericConfiguration;
use regsync_core::{
    normalize::{CurrentRegistry, NativeServiceRecord},
    resolve::ResolvedServiceConfig,
    scheme::ResolvedDeploymentScheme,
    sources::Registry,
};
use regsync_error::{ErrorContext as _, GenericError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{ResultExt as _, Snafu};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::retry::{is_retryable_status, RetryPolicy};

const JSON_CONTENT_TYPE: &str = "application/json";

fn default_operator_name() -> String {
    "automation".to_string()
}

const fn default_retry_attempts() -> usize {
    3
}

const fn default_retry_delay_secs() -> u64 {
    1
}

const fn default_request_timeout_secs() -> u64 {
    10
}

/// Registry client configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistryClientConfiguration {
    /// Base URL of the registry API.
    registry_url: Url,

    /// Username used for basic authentication and the session login.
    #[serde(default)]
    registry_username: String,

    /// Password used for basic authentication and the session login.
    #[serde(default)]
    registry_password: String,

    /// Name recorded in the comment attached to every change.
    ///
    /// Defaults to `automation`.
    #[serde(default = "default_operator_name")]
    operator_name: String,

    /// Number of times a failed request is retried.
    ///
    /// Defaults to `3`.
    #[serde(default = "default_retry_attempts")]
    retry_attempts: usize,

    /// Seconds to wait between retries.
    ///
    /// Defaults to `1`.
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,

    /// Timeout for a single request, in seconds.
    ///
    /// Defaults to `10`.
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

impl RegistryClientConfiguration {
    /// Creates a configuration for the registry at `registry_url`, with defaults for everything else.
    pub fn new(registry_url: Url) -> Self {
        Self {
            registry_url,
            registry_username: String::new(),
            registry_password: String::new(),
            operator_name: default_operator_name(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Reads the registry client configuration.
    ///
    /// # Errors
    ///
    /// If `registry_url` is missing or invalid, or any other key has the wrong type, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        config
            .as_typed()
            .error_context("Failed to parse registry client configuration.")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.registry_url.as_str().trim_end_matches('/'), path)
    }

    fn comment(&self) -> String {
        format!("regsync - {}", self.operator_name)
    }
}

/// Registry request errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RegistryError {
    #[snafu(display("Failed to build HTTP client: {}", source))]
    Client { source: reqwest::Error },

    #[snafu(display("Request to '{}' failed: {}", url, source))]
    Transport { url: String, source: reqwest::Error },

    #[snafu(display("Registry answered '{}' with {}: {}", url, status, body))]
    Status { url: String, status: StatusCode, body: String },

    #[snafu(display(
        "Registry answered '{}' with {} but no JSON payload. Check the registry credentials.",
        url,
        status
    ))]
    Authentication { url: String, status: StatusCode },

    #[snafu(display("Failed to decode response from '{}': {}", url, source))]
    Decode { url: String, source: reqwest::Error },
}

impl RegistryError {
    /// Returns `true` if the request may succeed when retried.
    ///
    /// Connection failures and transient statuses qualify. Authentication problems and other client errors do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            Self::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ServiceRegistration<'a> {
    comment: &'a str,
    services: &'a [ResolvedServiceConfig],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSchemeRegistration<'a> {
    comment: &'a str,
    deployment_schemes: &'a [ResolvedDeploymentScheme],
}

/// HTTP client for the service registry.
///
/// Requests carry basic authentication, and the client logs in once to obtain a session cookie before its first
/// request. Every request is retried according to the configured [`RetryPolicy`].
pub struct RegistryClient {
    inner: reqwest::Client,
    config: RegistryClientConfiguration,
    retry: RetryPolicy,
    session: OnceCell<()>,
}

impl RegistryClient {
    /// Creates a new `RegistryClient`.
    ///
    /// # Errors
    ///
    /// If the underlying HTTP client cannot be built, an error is returned.
    pub fn new(config: RegistryClientConfiguration) -> Result<Self, RegistryError> {
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context(Client)?;

        Ok(Self {
            inner,
            retry: config.retry_policy(),
            config,
            session: OnceCell::new(),
        })
    }

    async fn ensure_session(&self) -> Result<(), RegistryError> {
        self.session
            .get_or_try_init(|| async {
                let url = self.config.endpoint("/login");
                let form = [
                    ("username", self.config.registry_username.as_str()),
                    ("password", self.config.registry_password.as_str()),
                ];

                let login = || async {
                    let response = self.inner.post(&url).form(&form).send().await.context(Transport {
                        url: url.as_str(),
                    })?;
                    check_status(&url, response).await.map(|_| ())
                };

                login
                    .retry(&self.retry)
                    .when(RegistryError::is_retryable)
                    .notify(|e, delay| warn!(error = %e, "Registry login failed. Retrying in {:?}...", delay))
                    .await?;

                debug!(url = %url, "Logged in to registry.");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn send<F>(&self, url: &str, build: F) -> Result<reqwest::Response, RegistryError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.ensure_session().await?;

        let attempt = || async {
            let request = build(&self.inner).basic_auth(
                &self.config.registry_username,
                Some(&self.config.registry_password),
            );
            let response = request.send().await.context(Transport { url })?;
            check_response(url, response).await
        };

        attempt
            .retry(&self.retry)
            .when(RegistryError::is_retryable)
            .notify(|e, delay| warn!(error = %e, "Registry request failed. Retrying in {:?}...", delay))
            .await
    }

    async fn fetch_services(&self, environment_id: &str) -> Result<CurrentRegistry, RegistryError> {
        let url = self
            .config
            .endpoint(&format!("/service-discovery/v1/env/{}/sdi/services/current", environment_id));
        let response = self.send(&url, |client| client.get(&url)).await?;

        let services: BTreeMap<String, Vec<NativeServiceRecord>> =
            response.json().await.context(Decode { url: url.as_str() })?;
        Ok(CurrentRegistry::new(services))
    }

    async fn register(
        &self, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, RegistryError> {
        let url = self
            .config
            .endpoint(&format!("/service-discovery/v1/env/{}/services/registration", environment_id));
        let comment = self.config.comment();
        let body = ServiceRegistration {
            comment: &comment,
            services: configs,
        };

        let response = self.send(&url, |client| client.post(&url).json(&body)).await?;
        Ok(response.status().is_success())
    }

    async fn delete(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, RegistryError> {
        let url = self
            .config
            .endpoint(&format!("/service-discovery/v1/env/{}/services/{}/delete", environment_id, service));
        let comment = self.config.comment();

        let mut deleted = true;
        for record in records {
            let body = deletion_request(record, &comment);
            let response = self.send(&url, |client| client.post(&url).json(&body)).await?;
            deleted &= response.status().is_success();
        }

        Ok(deleted)
    }

    async fn register_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, RegistryError> {
        let url = self.config.endpoint(&format!(
            "/service-discovery/v1/env/{}/deployment-schemes/registration",
            environment_id
        ));
        let comment = self.config.comment();
        let body = DeploymentSchemeRegistration {
            comment: &comment,
            deployment_schemes: schemes,
        };

        let response = self.send(&url, |client| client.post(&url).json(&body)).await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn current_services(&self, environment_id: &str) -> Result<CurrentRegistry, GenericError> {
        Ok(self.fetch_services(environment_id).await?)
    }

    async fn register_service(
        &self, service: &str, environment_id: &str, configs: &[ResolvedServiceConfig],
    ) -> Result<bool, GenericError> {
        debug!(service, records = configs.len(), "Registering service.");
        Ok(self.register(environment_id, configs).await?)
    }

    async fn delete_service(
        &self, service: &str, environment_id: &str, records: &[NativeServiceRecord],
    ) -> Result<bool, GenericError> {
        debug!(service, records = records.len(), "Deleting service.");
        Ok(self.delete(service, environment_id, records).await?)
    }

    async fn register_deployment_schemes(
        &self, environment_id: &str, schemes: &[ResolvedDeploymentScheme],
    ) -> Result<bool, GenericError> {
        Ok(self.register_schemes(environment_id, schemes).await?)
    }
}

/// Builds the body deleting one record: the record itself, plus the version and pod keys the endpoint expects.
fn deletion_request(record: &NativeServiceRecord, comment: &str) -> Value {
    let mut body = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    body.insert(
        "serviceVersion".to_string(),
        record.version.clone().map_or(Value::Null, Value::String),
    );
    body.insert(
        "physicalEnv".to_string(),
        record.selected_pod.clone().map_or(Value::Null, Value::String),
    );
    body.insert("comment".to_string(), Value::String(comment.to_string()));
    Value::Object(body)
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_else(|_| String::from("<no body>"));
        return Status { url, status, body }.fail();
    }

    Ok(response)
}

async fn check_response(url: &str, response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let response = check_status(url, response).await?;

    // The registry answers unauthenticated requests with an HTML login page and a success status.
    let status = response.status();
    if status != StatusCode::NO_CONTENT && !is_json(response.headers()) {
        return Authentication { url, status }.fail();
    }

    Ok(response)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(JSON_CONTENT_TYPE))
}
