use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::backtest::{Backtest, BacktestId};
use crate::client::{field, integer_id, ApiClient};
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::project::{Project, ProjectId};
use crate::transport::{HttpTransport, Transport};

/// Entry point for creating and enumerating projects.
pub struct Catalog<T = HttpTransport> {
    client: Arc<ApiClient<T>>,
    logger: Logger,
}

impl<T> Catalog<T> {
    pub fn new(client: Arc<ApiClient<T>>) -> Self {
        let logger = client.logger().with_target("qcapi::catalog");
        Self { client, logger }
    }

    pub fn client(&self) -> &Arc<ApiClient<T>> {
        &self.client
    }

    /// Attaches to a project whose id is already known. No call is made.
    pub fn project(&self, id: ProjectId) -> Project<T> {
        Project::new(Arc::clone(&self.client), id, None)
    }

    /// Attaches to a backtest whose id is already known. No call is made.
    pub fn backtest(&self, id: impl Into<BacktestId>) -> Backtest<T> {
        Backtest::new(Arc::clone(&self.client), id)
    }
}

impl<T: Transport> Catalog<T> {
    pub async fn create_project(&self, name: &str) -> Result<Project<T>> {
        let route = "projects/create";
        let resp = self
            .client
            .perform(route, json!({ "projectName": name }))
            .await?;
        let id = integer_id(field(&resp, route, "projectId")?, route)?;
        self.logger
            .info(format_args!("CATALOG: Created project {} ({})", id, name));
        Ok(Project::new(
            Arc::clone(&self.client),
            id,
            Some(name.to_string()),
        ))
    }

    /// Every project, least recently modified first. The service returns all projects in one
    /// response, so nothing is paged.
    pub async fn list_projects(&self) -> Result<Vec<Project<T>>> {
        let route = "projects/read";
        let resp = self.client.perform(route, json!({})).await?;
        let listed = field(&resp, route, "projects")?
            .as_array()
            .ok_or_else(|| Error::malformed(route, "projects is not a list"))?;

        let mut entries = Vec::with_capacity(listed.len());
        for entry in listed {
            let id = integer_id(field(entry, route, "id")?, route)?;
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            let modified = entry.get("modified").unwrap_or(&Value::Null);
            entries.push((id, name, modified));
        }
        // Vec::sort_by is stable, so equal timestamps keep the service's order.
        entries.sort_by(|a, b| compare_modified(a.2, b.2));

        self.logger
            .debug(format_args!("CATALOG: Listed {} projects", entries.len()));
        Ok(entries
            .into_iter()
            .map(|(id, name, _)| Project::new(Arc::clone(&self.client), id, name))
            .collect())
    }
}

fn modified_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        _ => 3,
    }
}

/// Numbers numerically, strings lexicographically (`YYYY-MM-DD HH:MM:SS` sorts correctly that
/// way), null before numbers before strings.
fn compare_modified(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => modified_rank(a).cmp(&modified_rank(b)),
    }
}
