use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backtest::Backtest;
use crate::client::{field, string_field, ApiClient};
use crate::compile::{Compile, CompileId};
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::transport::{HttpTransport, Transport};

pub type ProjectId = i64;

/// One source file. Always sent whole; the service does no diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub code: String,
}

impl File {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Arguments to [`Project::backtest`]. Anything left unset is filled in at submission time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacktestRequest {
    pub name: Option<String>,
    pub compile_id: Option<CompileId>,
    pub version_id: Option<u32>,
}

impl BacktestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_compile_id(mut self, compile_id: impl Into<CompileId>) -> Self {
        self.compile_id = Some(compile_id.into());
        self
    }

    pub fn with_version(mut self, version_id: u32) -> Self {
        self.version_id = Some(version_id);
        self
    }
}

/// Handle on a remote project. Holds no copy of remote state: every method is one (or, for
/// [`Project::backtest`] without a compile id, two) round trips.
pub struct Project<T = HttpTransport> {
    pub id: ProjectId,
    pub name: Option<String>,
    client: Arc<ApiClient<T>>,
    logger: Logger,
}

impl<T> Clone for Project<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            client: Arc::clone(&self.client),
            logger: self.logger.clone(),
        }
    }
}

impl<T> fmt::Debug for Project<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<T> Project<T> {
    /// Attaches to a project that already exists remotely. No call is made.
    pub fn new(client: Arc<ApiClient<T>>, id: ProjectId, name: Option<String>) -> Self {
        let logger = client.logger().with_target("qcapi::project");
        Self {
            id,
            name,
            client,
            logger,
        }
    }

    pub fn client(&self) -> &Arc<ApiClient<T>> {
        &self.client
    }
}

impl<T: Transport> Project<T> {
    /// Overwrites the remote file set with `files`.
    pub async fn update(&self, files: &[File]) -> Result<()> {
        self.logger.debug(format_args!(
            "PROJECT: Updating {} files in project {}",
            files.len(),
            self.id
        ));
        self.client
            .perform(
                "projects/update",
                json!({ "projectId": self.id, "files": files }),
            )
            .await?;
        Ok(())
    }

    pub async fn read(&self) -> Result<Vec<File>> {
        self.logger.debug(format_args!(
            "PROJECT: Reading project files for project {}",
            self.id
        ));
        let route = "projects/read";
        let resp = self
            .client
            .perform(route, json!({ "projectId": self.id }))
            .await?;
        let files = field(&resp, route, "files")?;
        Vec::<File>::deserialize(files).map_err(|err| Error::malformed(route, err))
    }

    /// Compiles with the client's configured compiler version.
    pub async fn compile(&self) -> Result<Compile> {
        self.compile_with_version(self.client.compiler_version())
            .await
    }

    pub async fn compile_with_version(&self, version_id: u32) -> Result<Compile> {
        self.logger
            .debug(format_args!("PROJECT: Compiling project {}", self.id));
        let route = "compiler/create";
        let resp = self
            .client
            .perform(
                route,
                json!({ "projectId": self.id, "versionId": version_id }),
            )
            .await?;
        let compile = Compile::from_response(&resp, route)?;
        self.logger
            .debug(format_args!("PROJECT: Created compile {}", compile.id));
        Ok(compile)
    }

    /// Starts a backtest. Without a compile id, compiles first with the same version id.
    pub async fn backtest(&self, request: BacktestRequest) -> Result<Backtest<T>> {
        let version_id = request
            .version_id
            .unwrap_or_else(|| self.client.compiler_version());
        let name = match request.name {
            Some(name) => name,
            None => self.client.next_name(),
        };
        let compile_id = match request.compile_id {
            Some(compile_id) => compile_id,
            None => self.compile_with_version(version_id).await?.id,
        };

        let route = "backtests/create";
        let resp = self
            .client
            .perform(
                route,
                json!({
                    "projectId": self.id,
                    "compileId": compile_id,
                    "backtestName": name,
                    "versionId": version_id,
                }),
            )
            .await?;
        let backtest_id = string_field(&resp, route, "backtestId")?;
        self.logger
            .info(format_args!("PROJECT: Created backtest {}", backtest_id));
        Ok(Backtest::new(Arc::clone(&self.client), backtest_id))
    }

    /// Deletes the remote project. Outstanding handles on its compiles and backtests are not
    /// touched locally; using them afterwards fails remotely.
    pub async fn delete(&self) -> Result<()> {
        self.client
            .perform("projects/delete", json!({ "projectId": self.id }))
            .await?;
        self.logger
            .info(format_args!("PROJECT: Deleted project {}", self.id));
        Ok(())
    }
}
