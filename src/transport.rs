use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};

/// Identity and secret attached to every request. Fixed for the life of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// One authenticated POST of a JSON payload, returning the decoded JSON body.
///
/// Implementations report network failures, non-2xx statuses and undecodable bodies as
/// [`Error::Transport`]. They must not inspect the envelope: that is the job of
/// [`crate::client::ApiClient`].
pub trait Transport {
    fn post(
        &self,
        url: &str,
        payload: &Value,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// Upper bound on one round trip, connecting included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl Transport for HttpTransport {
    async fn post(&self, url: &str, payload: &Value, credentials: &Credentials) -> Result<Value> {
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .basic_auth(&credentials.user_id, Some(&credentials.token))
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        serde_json::from_str::<Value>(&body)
            .map_err(|err| Error::transport(format!("undecodable body from {url}: {err}")))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// A call that has not finished within `timeout` fails with [`Error::Transport`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
