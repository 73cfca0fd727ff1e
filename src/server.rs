//! Serves a [`crate::local::AppState`] over HTTP under the same paths as the remote service.
use std::sync::Mutex;

use actix_web::{post, web};
use derive_more::Display;
use serde_json::Value;

use crate::local::AppState;

pub const API_PREFIX: &str = "/api/v1";

pub type LocalState = Mutex<AppState>;

#[derive(Debug, Display)]
pub enum LocalServerError {
    #[display("unknown route {_0}")]
    UnknownRoute(String),
}

impl std::error::Error for LocalServerError {}

impl actix_web::ResponseError for LocalServerError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            LocalServerError::UnknownRoute(_) => actix_web::http::StatusCode::NOT_FOUND,
        }
    }
}

#[post("/{group}/{action}")]
pub async fn route(
    app: web::Data<LocalState>,
    path: web::Path<(String, String)>,
    payload: web::Json<Value>,
) -> Result<web::Json<Value>, LocalServerError> {
    let (group, action) = path.into_inner();
    let route = format!("{group}/{action}");
    let mut state = match app.lock() {
        Ok(state) => state,
        Err(poisoned) => poisoned.into_inner(),
    };
    state
        .handle(&route, &payload)
        .map(web::Json)
        .ok_or(LocalServerError::UnknownRoute(route))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope(API_PREFIX).service(route));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Value};

    use super::configure;
    use crate::local::AppState;

    #[actix_web::test]
    async fn test_project_compile_backtest_loop() {
        let state = web::Data::new(Mutex::new(AppState::new().with_pending_reads(1)));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/projects/create")
            .set_json(json!({"projectName": "served"}))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], json!(true));
        let project_id = resp["projectId"].clone();

        let req = test::TestRequest::post()
            .uri("/api/v1/compiler/create")
            .set_json(json!({"projectId": project_id, "versionId": 357}))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        let compile_id = resp["compileId"].clone();

        let req = test::TestRequest::post()
            .uri("/api/v1/backtests/create")
            .set_json(json!({
                "projectId": project_id,
                "compileId": compile_id,
                "backtestName": "served-bt",
                "versionId": 357,
            }))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        let backtest_id = resp["backtestId"].clone();

        let read = json!({"backtestId": backtest_id});
        let req = test::TestRequest::post()
            .uri("/api/v1/backtests/read")
            .set_json(read.clone())
            .to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/backtests/read")
            .set_json(read)
            .to_request();
        let second: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(first["processingTime"], json!("-1"));
        assert_ne!(second["processingTime"], json!("-1"));
        assert_eq!(second["name"], json!("served-bt"));
    }

    #[actix_web::test]
    async fn test_that_unknown_route_is_not_found() {
        let state = web::Data::new(Mutex::new(AppState::new()));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/nodes/read")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_that_missing_project_is_reported_in_envelope() {
        let state = web::Data::new(Mutex::new(AppState::new()));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/projects/read")
            .set_json(json!({"projectId": 3}))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], json!(false));
        assert_eq!(resp["errors"], json!(["Project 3 not found"]));
    }
}
