use crate::infra::{AppState, SessionRegistry};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use loan_flow::error::AppError;
use loan_flow::forms::ApplicationId;
use loan_flow::tasks::BackgroundTaskView;
use loan_flow::workflow::{Role, Stage, Transition};
use loan_flow::{FieldUpdate, NetworkStatus, SessionSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSessionRequest {
    pub(crate) role: Role,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldValueRequest {
    pub(crate) value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoToRequest {
    pub(crate) stage: Stage,
    pub(crate) sub_stage: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetworkRequest {
    pub(crate) online: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct NavigationResponse {
    pub(crate) transition: Transition,
    pub(crate) snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct NetworkResponse {
    pub(crate) changed: bool,
    pub(crate) status: NetworkStatus,
}

pub(crate) fn with_application_routes(registry: SessionRegistry) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/applications/:application_id/session",
            post(open_session).delete(close_session),
        )
        .route("/api/v1/applications/:application_id", get(snapshot))
        .route(
            "/api/v1/applications/:application_id/fields/:field",
            put(update_field),
        )
        .route("/api/v1/applications/:application_id/next", post(next))
        .route("/api/v1/applications/:application_id/prev", post(prev))
        .route("/api/v1/applications/:application_id/goto", post(go_to))
        .route(
            "/api/v1/applications/:application_id/tasks/:task/start",
            post(start_task),
        )
        .route("/api/v1/network", put(set_network))
        .with_state(registry);

    api.route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn open_session(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = registry.open(ApplicationId::from(application_id), request.role)?;
    Ok((StatusCode::CREATED, Json(session.snapshot())))
}

pub(crate) async fn close_session(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
) -> Result<StatusCode, AppError> {
    registry.close(&ApplicationId::from(application_id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn snapshot(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    Ok(Json(session.snapshot()))
}

pub(crate) async fn update_field(
    State(registry): State<SessionRegistry>,
    Path((application_id, field)): Path<(String, String)>,
    Json(request): Json<FieldValueRequest>,
) -> Result<Json<FieldUpdate>, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    let update = session.update_field(field, request.value)?;
    Ok(Json(update))
}

pub(crate) async fn next(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
) -> Result<Json<NavigationResponse>, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    let transition = session.next()?;
    Ok(Json(NavigationResponse {
        transition,
        snapshot: session.snapshot(),
    }))
}

pub(crate) async fn prev(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
) -> Result<Json<NavigationResponse>, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    let transition = session.prev();
    Ok(Json(NavigationResponse {
        transition,
        snapshot: session.snapshot(),
    }))
}

pub(crate) async fn go_to(
    State(registry): State<SessionRegistry>,
    Path(application_id): Path<String>,
    Json(request): Json<GoToRequest>,
) -> Result<Json<NavigationResponse>, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    let transition = session.go_to(request.stage, &request.sub_stage)?;
    Ok(Json(NavigationResponse {
        transition,
        snapshot: session.snapshot(),
    }))
}

pub(crate) async fn start_task(
    State(registry): State<SessionRegistry>,
    Path((application_id, task)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let session = registry.get(&ApplicationId::from(application_id))?;
    let view: BackgroundTaskView = session.start_task(&task)?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

pub(crate) async fn set_network(
    State(registry): State<SessionRegistry>,
    Json(request): Json<NetworkRequest>,
) -> Json<NetworkResponse> {
    let network = registry.network();
    let changed = network.set_online(request.online);
    if changed {
        info!(online = request.online, "connectivity reported by client");
    }

    Json(NetworkResponse {
        changed,
        status: network.status(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::testing::registry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(registry: SessionRegistry, ready: bool) -> Router {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        with_application_routes(registry).layer(Extension(AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(handle),
        }))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    async fn read_json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = app(registry(), false)
            .oneshot(empty_request("GET", "/ready"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(registry(), true)
            .oneshot(empty_request("GET", "/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let router = app(registry(), true);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/applications/app-1/session",
                json!({"role": "Agent"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json_body(response).await;
        assert_eq!(body["position"]["subStage"], json!("basic-details"));

        for (field, value) in [
            ("fullName", json!("Ann")),
            ("email", json!("a@b.com")),
            ("phone", json!("555")),
        ] {
            let response = router
                .clone()
                .oneshot(json_request(
                    "PUT",
                    &format!("/api/v1/applications/app-1/fields/{field}"),
                    json!({ "value": value }),
                ))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .clone()
            .oneshot(empty_request("POST", "/api/v1/applications/app-1/next"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["transition"]["to"]["subStage"], json!("otp-verification"));

        let response = router
            .clone()
            .oneshot(empty_request("DELETE", "/api/v1/applications/app-1/session"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router
            .oneshot(empty_request("GET", "/api/v1/applications/app-1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn navigation_failures_map_to_client_errors() {
        let router = app(registry(), true);
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/applications/app-2/session",
                json!({"role": "Agent"}),
            ))
            .await
            .expect("response");

        let response = router
            .clone()
            .oneshot(empty_request("POST", "/api/v1/applications/app-2/next"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json_body(response).await;
        assert_eq!(body["kind"], json!("validation"));
        assert_eq!(body["missingFields"], json!(["fullName", "email", "phone"]));

        let response = router
            .oneshot(json_request(
                "POST",
                "/api/v1/applications/app-2/goto",
                json!({"stage": "underwriting", "subStage": "overrides"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn offline_task_start_is_a_conflict() {
        let registry = registry();
        let router = app(registry.clone(), true);
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/applications/app-3/session",
                json!({"role": "Underwriter"}),
            ))
            .await
            .expect("response");

        let response = router
            .clone()
            .oneshot(json_request("PUT", "/api/v1/network", json!({"online": false})))
            .await
            .expect("response");
        let body = read_json_body(response).await;
        assert_eq!(body["changed"], json!(true));
        assert_eq!(body["status"]["isOnline"], json!(false));

        let response = router
            .oneshot(empty_request(
                "POST",
                "/api/v1/applications/app-3/tasks/creditBureauCheck/start",
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(!registry.network().is_online());
    }
}
