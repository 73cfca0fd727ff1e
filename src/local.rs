//! In-process stand-in for the remote research service.
//!
//! [`AppState`] models the routes the client consumes closely enough to drive a whole project
//! lifecycle without a network: projects and their files, compiles, and backtests that report a
//! pending processing time for a configurable number of reads. [`LocalTransport`] plugs it into an
//! [`crate::client::ApiClient`] and records every call, and [`crate::server`] serves the same
//! state over HTTP.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use time::macros::{datetime, format_description};

use crate::client::integer_id;
use crate::error::{Error, Result};
use crate::project::{File, ProjectId};
use crate::transport::{Credentials, Transport};

pub const PENDING_PROCESSING_TIME: &str = "-1";

struct ProjectState {
    id: ProjectId,
    name: String,
    files: Vec<File>,
    created: i64,
    modified: i64,
}

struct CompileState {
    project_id: ProjectId,
}

struct BacktestState {
    id: String,
    name: String,
    project_id: ProjectId,
    compile_id: String,
    reads: u32,
}

pub struct AppState {
    projects: BTreeMap<ProjectId, ProjectState>,
    compiles: HashMap<String, CompileState>,
    backtests: HashMap<String, BacktestState>,
    last_project: ProjectId,
    last_compile: u64,
    last_backtest: u64,
    clock: i64,
    pending_reads: u32,
    processing_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    project_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadProjectRequest {
    project_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProjectRequest {
    project_id: Value,
    files: Vec<File>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRequest {
    project_id: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompileRequest {
    project_id: Value,
    version_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBacktestRequest {
    project_id: Value,
    compile_id: String,
    backtest_name: String,
    version_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BacktestRequest {
    backtest_id: String,
}

type RouteResult = std::result::Result<Value, String>;

fn parse<T: for<'de> Deserialize<'de>>(payload: &Value) -> std::result::Result<T, String> {
    T::deserialize(payload).map_err(|err| format!("Invalid request: {err}"))
}

fn parse_project_id(value: &Value, route: &str) -> std::result::Result<ProjectId, String> {
    integer_id(value, route).map_err(|err| err.to_string())
}

fn timestamp(seconds: i64) -> String {
    let at = datetime!(2024-01-01 0:00 UTC) + time::Duration::seconds(seconds);
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| seconds.to_string())
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            projects: BTreeMap::new(),
            compiles: HashMap::new(),
            backtests: HashMap::new(),
            last_project: 0,
            last_compile: 0,
            last_backtest: 0,
            clock: 0,
            pending_reads: 0,
            processing_time: "1.0".to_string(),
        }
    }

    /// Backtests report [`PENDING_PROCESSING_TIME`] for their first `reads` reads.
    pub fn with_pending_reads(mut self, reads: u32) -> Self {
        self.pending_reads = reads;
        self
    }

    /// Processing time reported once a backtest has completed.
    pub fn with_processing_time(mut self, processing_time: impl Into<String>) -> Self {
        self.processing_time = processing_time.into();
        self
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn backtest_count(&self) -> usize {
        self.backtests.len()
    }

    /// Dispatches one route. Returns `None` when the route does not exist.
    pub fn handle(&mut self, route: &str, payload: &Value) -> Option<Value> {
        let route = route.trim_matches('/');
        let result = match route {
            "projects/create" => self.create_project(payload),
            "projects/read" => self.read_project(payload),
            "projects/update" => self.update_project(payload),
            "projects/delete" => self.delete_project(payload),
            "compiler/create" => self.create_compile(payload),
            "backtests/create" => self.create_backtest(payload),
            "backtests/read" => self.read_backtest(payload),
            "backtests/delete" => self.delete_backtest(payload),
            _ => return None,
        };
        Some(envelope(result))
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn project_mut(&mut self, id: ProjectId) -> std::result::Result<&mut ProjectState, String> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| format!("Project {id} not found"))
    }

    fn create_project(&mut self, payload: &Value) -> RouteResult {
        let req: CreateProjectRequest = parse(payload)?;
        let now = self.tick();
        let id = self.last_project + 1;
        self.projects.insert(
            id,
            ProjectState {
                id,
                name: req.project_name,
                files: Vec::new(),
                created: now,
                modified: now,
            },
        );
        self.last_project = id;
        Ok(json!({ "projectId": id }))
    }

    fn read_project(&mut self, payload: &Value) -> RouteResult {
        let req: ReadProjectRequest = if payload.is_null() {
            ReadProjectRequest { project_id: None }
        } else {
            parse(payload)?
        };
        match req.project_id {
            Some(raw) => {
                let id = parse_project_id(&raw, "projects/read")?;
                let project = self.project_mut(id)?;
                Ok(json!({ "files": project.files }))
            }
            None => {
                let projects: Vec<Value> = self
                    .projects
                    .values()
                    .map(|p| {
                        json!({
                            "id": p.id,
                            "name": p.name,
                            "created": timestamp(p.created),
                            "modified": timestamp(p.modified),
                        })
                    })
                    .collect();
                Ok(json!({ "projects": projects }))
            }
        }
    }

    fn update_project(&mut self, payload: &Value) -> RouteResult {
        let req: UpdateProjectRequest = parse(payload)?;
        let id = parse_project_id(&req.project_id, "projects/update")?;
        let now = self.tick();
        let project = self.project_mut(id)?;
        project.files = req.files;
        project.modified = now;
        Ok(json!({}))
    }

    fn delete_project(&mut self, payload: &Value) -> RouteResult {
        let req: ProjectRequest = parse(payload)?;
        let id = parse_project_id(&req.project_id, "projects/delete")?;
        if self.projects.remove(&id).is_none() {
            return Err(format!("Project {id} not found"));
        }
        self.compiles.retain(|_, c| c.project_id != id);
        self.backtests.retain(|_, b| b.project_id != id);
        Ok(json!({}))
    }

    fn create_compile(&mut self, payload: &Value) -> RouteResult {
        let req: CompileRequest = parse(payload)?;
        if req.version_id.is_none() {
            return Err("versionId is required".to_string());
        }
        let id = parse_project_id(&req.project_id, "compiler/create")?;
        let file_count = self.project_mut(id)?.files.len();
        let compile_id = format!("compile-{}", self.last_compile + 1);
        self.last_compile += 1;
        self.compiles
            .insert(compile_id.clone(), CompileState { project_id: id });
        Ok(json!({
            "compileId": compile_id,
            "state": "BuildSuccess",
            "log": [
                format!("Build Request Successful for Project ID: {id}"),
                format!("Compiled {file_count} files"),
            ],
        }))
    }

    fn create_backtest(&mut self, payload: &Value) -> RouteResult {
        let req: CreateBacktestRequest = parse(payload)?;
        if req.version_id.is_none() {
            return Err("versionId is required".to_string());
        }
        let id = parse_project_id(&req.project_id, "backtests/create")?;
        self.project_mut(id)?;
        match self.compiles.get(&req.compile_id) {
            Some(compile) if compile.project_id == id => {}
            _ => return Err(format!("Compile {} not found", req.compile_id)),
        }
        let backtest_id = format!("backtest-{}", self.last_backtest + 1);
        self.last_backtest += 1;
        self.backtests.insert(
            backtest_id.clone(),
            BacktestState {
                id: backtest_id.clone(),
                name: req.backtest_name,
                project_id: id,
                compile_id: req.compile_id,
                reads: 0,
            },
        );
        Ok(json!({ "backtestId": backtest_id }))
    }

    fn read_backtest(&mut self, payload: &Value) -> RouteResult {
        let req: BacktestRequest = parse(payload)?;
        let pending_reads = self.pending_reads;
        let backtest = self
            .backtests
            .get_mut(&req.backtest_id)
            .ok_or_else(|| format!("Backtest {} not found", req.backtest_id))?;
        backtest.reads += 1;
        let completed = backtest.reads > pending_reads;
        let processing_time = if completed {
            self.processing_time.clone()
        } else {
            PENDING_PROCESSING_TIME.to_string()
        };
        let result = if completed {
            json!({ "Statistics": { "Total Trades": "0" } })
        } else {
            Value::Null
        };
        Ok(json!({
            "backtestId": backtest.id,
            "name": backtest.name,
            "compileId": backtest.compile_id,
            "completed": completed,
            "processingTime": processing_time,
            "result": result,
        }))
    }

    fn delete_backtest(&mut self, payload: &Value) -> RouteResult {
        let req: BacktestRequest = parse(payload)?;
        match self.backtests.remove(&req.backtest_id) {
            Some(_) => Ok(json!({})),
            None => Err(format!("Backtest {} not found", req.backtest_id)),
        }
    }
}

fn envelope(result: RouteResult) -> Value {
    match result {
        Ok(Value::Object(mut body)) => {
            body.insert("success".to_string(), Value::Bool(true));
            Value::Object(body)
        }
        Ok(other) => {
            let mut body = Map::new();
            body.insert("success".to_string(), Value::Bool(true));
            body.insert("data".to_string(), other);
            Value::Object(body)
        }
        Err(message) => json!({ "success": false, "errors": [message] }),
    }
}

/// One recorded call through a [`LocalTransport`].
#[derive(Clone, Debug)]
pub struct Call {
    pub url: String,
    pub route: String,
    pub payload: Value,
    pub credentials: Credentials,
}

/// [`Transport`] answering from an in-memory [`AppState`].
///
/// Responses queued with [`LocalTransport::respond_with`] or [`LocalTransport::fail_with`] are
/// returned first, in order, before the state is consulted again.
pub struct LocalTransport {
    state: Mutex<AppState>,
    credentials: Option<Credentials>,
    scripted: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<Call>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn route_of(url: &str) -> String {
    let mut parts = url.trim_end_matches('/').rsplit('/');
    let action = parts.next().unwrap_or_default();
    let group = parts.next().unwrap_or_default();
    format!("{group}/{action}")
}

impl LocalTransport {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Mutex::new(state),
            credentials: None,
            scripted: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Rejects any call not made with `credentials`.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn respond_with(&self, body: Value) {
        lock(&self.scripted).push_back(Ok(body));
    }

    pub fn fail_with(&self, err: Error) {
        lock(&self.scripted).push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn routes(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.route.clone()).collect()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    fn answer(&self, url: &str, payload: &Value, credentials: &Credentials) -> Result<Value> {
        let route = route_of(url);
        lock(&self.calls).push(Call {
            url: url.to_string(),
            route: route.clone(),
            payload: payload.clone(),
            credentials: credentials.clone(),
        });

        if let Some(expected) = &self.credentials {
            if expected != credentials {
                return Err(Error::Transport {
                    status: Some(401),
                    message: format!("401 Unauthorized for url ({url})"),
                });
            }
        }

        if let Some(scripted) = lock(&self.scripted).pop_front() {
            return scripted;
        }

        lock(&self.state)
            .handle(&route, payload)
            .ok_or_else(|| Error::Transport {
                status: Some(404),
                message: format!("404 Not Found for url ({url})"),
            })
    }
}

impl Transport for LocalTransport {
    async fn post(&self, url: &str, payload: &Value, credentials: &Credentials) -> Result<Value> {
        self.answer(url, payload, credentials)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{route_of, AppState, PENDING_PROCESSING_TIME};

    #[test]
    fn test_that_route_is_taken_from_last_two_segments() {
        assert_eq!(
            route_of("https://www.quantconnect.com/api/v1/backtests/read"),
            "backtests/read"
        );
    }

    #[test]
    fn test_that_compile_without_version_is_rejected() {
        let mut state = AppState::new();
        let created = state
            .handle("projects/create", &json!({"projectName": "a"}))
            .unwrap();
        let id = created["projectId"].clone();

        let resp = state
            .handle("compiler/create", &json!({"projectId": id}))
            .unwrap();
        assert_eq!(resp["success"], json!(false));
        assert_eq!(resp["errors"], json!(["versionId is required"]));
    }

    #[test]
    fn test_that_backtest_is_pending_for_configured_reads() {
        let mut state = AppState::new()
            .with_pending_reads(2)
            .with_processing_time("12.3");
        let id = state
            .handle("projects/create", &json!({"projectName": "a"}))
            .unwrap()["projectId"]
            .clone();
        let compile_id = state
            .handle("compiler/create", &json!({"projectId": id, "versionId": 357}))
            .unwrap()["compileId"]
            .clone();
        let backtest_id = state
            .handle(
                "backtests/create",
                &json!({
                    "projectId": id,
                    "compileId": compile_id,
                    "backtestName": "bt",
                    "versionId": 357,
                }),
            )
            .unwrap()["backtestId"]
            .clone();

        let read = json!({ "backtestId": backtest_id });
        let times: Vec<_> = (0..3)
            .map(|_| state.handle("backtests/read", &read).unwrap()["processingTime"].clone())
            .collect();
        assert_eq!(
            times,
            vec![
                json!(PENDING_PROCESSING_TIME),
                json!(PENDING_PROCESSING_TIME),
                json!("12.3")
            ]
        );
    }

    #[test]
    fn test_that_deleting_project_drops_its_backtests() {
        let mut state = AppState::new();
        let id = state
            .handle("projects/create", &json!({"projectName": "a"}))
            .unwrap()["projectId"]
            .clone();
        let compile_id = state
            .handle("compiler/create", &json!({"projectId": id, "versionId": 357}))
            .unwrap()["compileId"]
            .clone();
        state.handle(
            "backtests/create",
            &json!({
                "projectId": id,
                "compileId": compile_id,
                "backtestName": "bt",
                "versionId": 357,
            }),
        );
        assert_eq!(state.backtest_count(), 1);

        let resp = state
            .handle("projects/delete", &json!({"projectId": id}))
            .unwrap();
        assert_eq!(resp["success"], json!(true));
        assert_eq!(state.project_count(), 0);
        assert_eq!(state.backtest_count(), 0);
    }

    #[test]
    fn test_that_unknown_route_is_not_handled() {
        let mut state = AppState::new();
        assert!(state.handle("nodes/read", &json!({})).is_none());
    }

    #[test]
    fn test_that_modified_timestamps_sort_as_strings() {
        let mut state = AppState::new();
        state.handle("projects/create", &json!({"projectName": "a"}));
        state.handle("projects/create", &json!({"projectName": "b"}));
        let resp = state.handle("projects/read", &json!({})).unwrap();
        let first = resp["projects"][0]["modified"].as_str().unwrap().to_string();
        let second = resp["projects"][1]["modified"].as_str().unwrap().to_string();
        assert_eq!(first, "2024-01-01 00:00:01");
        assert!(first < second);
    }
}
