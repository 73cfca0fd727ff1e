//! Settings for building a client from a JSON document or the environment.
//!
//! ```json
//! { "username": "1234", "password": "abcd", "project_id": "42" }
//! ```
//!
//! `user_id`/`token` are accepted in place of `username`/`password`. Everything except the
//! credentials has a default.
use std::env;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::backtest::WaitOptions;
use crate::catalog::Catalog;
use crate::client::{
    integer_id, ApiClient, ApiClientBuilder, DEFAULT_BASE_URL, DEFAULT_COMPILER_VERSION,
};
use crate::error::{Error, Result};
use crate::project::{Project, ProjectId};
use crate::transport::{Credentials, HttpTransport, DEFAULT_REQUEST_TIMEOUT};

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_compiler_version() -> u32 {
    DEFAULT_COMPILER_VERSION
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(alias = "username")]
    pub user_id: String,
    #[serde(alias = "password")]
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_compiler_version")]
    pub compiler_version: u32,
    /// Integer or numeric string.
    #[serde(default)]
    pub project_id: Option<Value>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub max_wait_attempts: Option<u32>,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("compiler_version", &self.compiler_version)
            .field("project_id", &self.project_id)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_wait_attempts", &self.max_wait_attempts)
            .field("wait_timeout_secs", &self.wait_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| Error::Config(format!("{name} is not set")))
}

fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw}"))),
        None => Ok(None),
    }
}

impl Config {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            base_url: default_base_url(),
            compiler_version: default_compiler_version(),
            project_id: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_attempts: None,
            wait_timeout_secs: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|err| Error::Config(err.to_string()))
    }

    /// Reads `QC_USER_ID`, `QC_TOKEN`, and optionally `QC_BASE_URL`, `QC_COMPILER_VERSION`,
    /// `QC_PROJECT_ID`, `QC_POLL_INTERVAL_MS`, `QC_MAX_WAIT_ATTEMPTS`, `QC_WAIT_TIMEOUT_SECS`,
    /// `QC_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::new(required("QC_USER_ID")?, required("QC_TOKEN")?);
        if let Some(base_url) = var("QC_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(version) = parsed::<u32>("QC_COMPILER_VERSION")? {
            config.compiler_version = version;
        }
        if let Some(project_id) = parsed::<ProjectId>("QC_PROJECT_ID")? {
            config.project_id = Some(Value::from(project_id));
        }
        if let Some(interval) = parsed::<u64>("QC_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = interval;
        }
        config.max_wait_attempts = parsed::<u32>("QC_MAX_WAIT_ATTEMPTS")?;
        config.wait_timeout_secs = parsed::<u64>("QC_WAIT_TIMEOUT_SECS")?;
        if let Some(timeout) = parsed::<u64>("QC_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = timeout;
        }
        Ok(config)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user_id.clone(), self.token.clone())
    }

    pub fn builder(&self) -> ApiClientBuilder<HttpTransport> {
        ApiClientBuilder::new(self.credentials())
            .with_base_url(self.base_url.clone())
            .with_compiler_version(self.compiler_version)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn client(&self) -> Arc<ApiClient<HttpTransport>> {
        Arc::new(self.builder().build())
    }

    pub fn catalog(&self) -> Catalog<HttpTransport> {
        Catalog::new(self.client())
    }

    pub fn project_id(&self) -> Result<ProjectId> {
        match &self.project_id {
            Some(raw) => integer_id(raw, "config")
                .map_err(|_| Error::Config(format!("project_id is not an integer: {raw}"))),
            None => Err(Error::Config("project_id is not set".to_string())),
        }
    }

    /// The configured project on a fresh client.
    pub fn project(&self) -> Result<Project<HttpTransport>> {
        let id = self.project_id()?;
        Ok(Project::new(self.client(), id, None))
    }

    pub fn wait_options(&self) -> WaitOptions {
        let mut options = WaitOptions::new(Duration::from_millis(self.poll_interval_ms));
        options.max_attempts = self.max_wait_attempts;
        options.timeout = self.wait_timeout_secs.map(Duration::from_secs);
        options
    }
}
