use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::names::{NameGenerator, UuidNames};
use crate::transport::{Credentials, HttpTransport, Transport};

pub const DEFAULT_BASE_URL: &str = "https://www.quantconnect.com/api/v1";
/// Compiler version known to work with `compiler/create` and `backtests/create`. The remote
/// service rejects those calls when no version is sent, so one is always sent.
pub const DEFAULT_COMPILER_VERSION: u32 = 357;

/// Owns credentials and endpoint, and enforces the response envelope contract for every route.
///
/// Performs each call exactly once. Nothing is retried here: creating calls are not idempotent,
/// so retry policy belongs to the caller.
pub struct ApiClient<T = HttpTransport> {
    base_url: String,
    credentials: Credentials,
    transport: T,
    compiler_version: u32,
    names: Arc<dyn NameGenerator>,
    logger: Logger,
}

impl ApiClient<HttpTransport> {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        ApiClientBuilder::new(Credentials::new(user_id, token)).build()
    }
}

impl<T: Transport> ApiClient<T> {
    /// Sends `payload` to `route` and returns the full decoded envelope when it declares success.
    pub async fn perform(&self, route: &str, payload: Value) -> Result<Value> {
        let url = self.url(route);
        self.logger.debug(format_args!("CLIENT: POST {}", url));
        let body = self
            .transport
            .post(&url, &payload, &self.credentials)
            .await?;
        match check_envelope(route, body) {
            Ok(body) => Ok(body),
            Err(err) => {
                self.logger
                    .debug(format_args!("CLIENT: {} failed with {}", route, err));
                Err(err)
            }
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }
}

impl<T> ApiClient<T> {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn compiler_version(&self) -> u32 {
        self.compiler_version
    }

    pub fn next_name(&self) -> String {
        self.names.next_name()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

fn check_envelope(route: &str, body: Value) -> Result<Value> {
    match body.get("success") {
        Some(Value::Bool(true)) => Ok(body),
        Some(Value::Bool(false)) => Err(Error::Api(
            body.get("errors").cloned().unwrap_or(Value::Null),
        )),
        _ => Err(Error::malformed(route, "missing success flag")),
    }
}

pub(crate) fn field<'a>(body: &'a Value, route: &str, name: &str) -> Result<&'a Value> {
    body.get(name)
        .ok_or_else(|| Error::malformed(route, format!("missing field {name}")))
}

/// Remote ids arrive as JSON strings or numbers depending on the route.
pub(crate) fn string_field(body: &Value, route: &str, name: &str) -> Result<String> {
    match field(body, route, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::malformed(
            route,
            format!("field {name} is not a string: {other}"),
        )),
    }
}

pub(crate) fn integer_id(value: &Value, route: &str) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::malformed(route, format!("not an integer id: {value}")))
}

pub struct ApiClientBuilder<T = HttpTransport> {
    base_url: String,
    credentials: Credentials,
    transport: T,
    compiler_version: u32,
    names: Arc<dyn NameGenerator>,
    logger: Logger,
}

impl ApiClientBuilder<HttpTransport> {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
            transport: HttpTransport::new(),
            compiler_version: DEFAULT_COMPILER_VERSION,
            names: Arc::new(UuidNames),
            logger: Logger::default(),
        }
    }

    /// Bounds every call made by the built client; see [`HttpTransport::with_timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }
}

impl<T> ApiClientBuilder<T> {
    pub fn build(self) -> ApiClient<T> {
        ApiClient {
            base_url: self.base_url,
            credentials: self.credentials,
            transport: self.transport,
            compiler_version: self.compiler_version,
            names: self.names,
            logger: self.logger.with_target("qcapi::client"),
        }
    }

    pub fn with_transport<U: Transport>(self, transport: U) -> ApiClientBuilder<U> {
        ApiClientBuilder {
            base_url: self.base_url,
            credentials: self.credentials,
            transport,
            compiler_version: self.compiler_version,
            names: self.names,
            logger: self.logger,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_compiler_version(mut self, version_id: u32) -> Self {
        self.compiler_version = version_id;
        self
    }

    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use std::time::Duration;

    use super::{ApiClientBuilder, DEFAULT_BASE_URL, DEFAULT_COMPILER_VERSION};
    use crate::error::Error;
    use crate::local::{AppState, LocalTransport};
    use crate::transport::{Credentials, DEFAULT_REQUEST_TIMEOUT};

    fn creds() -> Credentials {
        Credentials::new("42", "token")
    }

    fn client_with(transport: LocalTransport) -> super::ApiClient<LocalTransport> {
        ApiClientBuilder::new(creds())
            .with_base_url("http://local/api/v1/")
            .with_transport(transport)
            .build()
    }

    #[test]
    fn test_that_builder_defaults_match_remote_service() {
        let client = ApiClientBuilder::new(creds()).build();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.compiler_version(), DEFAULT_COMPILER_VERSION);
        assert_eq!(client.transport().timeout, DEFAULT_REQUEST_TIMEOUT);

        let client = ApiClientBuilder::new(creds())
            .with_request_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(client.transport().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_that_url_joins_with_single_slash() {
        let client = client_with(LocalTransport::new(AppState::new()));
        assert_eq!(
            client.url("/projects/read"),
            "http://local/api/v1/projects/read"
        );
        assert_eq!(client.url("backtests/read"), "http://local/api/v1/backtests/read");
    }

    #[tokio::test]
    async fn test_that_every_call_carries_client_credentials() {
        let client = client_with(LocalTransport::new(AppState::new()));
        client
            .perform("projects/create", json!({"projectName": "a"}))
            .await
            .unwrap();
        client.perform("projects/read", json!({})).await.unwrap();
        let _ = client
            .perform("projects/delete", json!({"projectId": 999}))
            .await;

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].url, "http://local/api/v1/projects/create");
        assert_eq!(calls[2].url, "http://local/api/v1/projects/delete");
        assert!(calls.iter().all(|call| call.credentials == creds()));
    }

    #[tokio::test]
    async fn test_that_unsuccessful_envelope_raises_api_error_verbatim() {
        let transport = LocalTransport::new(AppState::new());
        transport.respond_with(json!({"success": false, "errors": ["bad token"]}));
        let client = client_with(transport);

        let err = client.perform("projects/read", json!({})).await.unwrap_err();
        assert!(err.is_api());
        assert_eq!(err.api_errors(), Some(&json!(["bad token"])));
    }

    #[tokio::test]
    async fn test_that_successful_envelope_is_returned_whole() {
        let transport = LocalTransport::new(AppState::new());
        let body = json!({"success": true, "errors": ["ignored"], "extra": {"a": 1}});
        transport.respond_with(body.clone());
        let client = client_with(transport);

        let resp = client.perform("projects/read", json!({})).await.unwrap();
        assert_eq!(resp, body);
    }

    #[tokio::test]
    async fn test_that_missing_success_flag_is_a_transport_error() {
        let transport = LocalTransport::new(AppState::new());
        transport.respond_with(json!({"projects": []}));
        let client = client_with(transport);

        let err = client.perform("projects/read", json!({})).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_that_failed_envelope_without_errors_field_carries_null() {
        let transport = LocalTransport::new(AppState::new());
        transport.respond_with(json!({"success": false}));
        let client = client_with(transport);

        match client.perform("projects/read", json!({})).await {
            Err(Error::Api(detail)) => assert!(detail.is_null()),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_that_wrong_credentials_surface_transport_error() {
        let transport =
            LocalTransport::new(AppState::new()).with_credentials(Credentials::new("1", "other"));
        let client = client_with(transport);

        let err = client.perform("projects/read", json!({})).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
