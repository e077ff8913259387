//! REST + SSE endpoints for the quiz.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CACHE_CONTROL;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::controller::StageController;
use super::model::{Choice, ProfileForm};
use super::report::ReportEvent;
use crate::error::QuizError;

/// Single-page client served at `/`.
const INDEX_HTML: &str = include_str!("../../web/index.html");

/// Shared state for quiz routes.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StageController>,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    #[serde(default)]
    choice: Option<Choice>,
}

/// Build the quiz router, including `/health`.
pub fn quiz_routes(controller: Arc<StageController>) -> Router {
    let state = AppState { controller };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/start", post(start))
        .route("/api/sessions/{id}/answer", post(answer))
        .route("/api/sessions/{id}/report", post(report))
        .route("/api/sessions/{id}/report/stream", get(stream_report))
        .route("/api/sessions/{id}/restart", post(restart))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

impl IntoResponse for QuizError {
    fn into_response(self) -> Response {
        let status = match &self {
            QuizError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QuizError::WrongStage { .. } | QuizError::Conflict => StatusCode::CONFLICT,
            QuizError::Service(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(error_body(&self))).into_response()
    }
}

fn error_body(err: &QuizError) -> serde_json::Value {
    json!({ "error": err.kind(), "message": err.to_string() })
}

fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_session_id", "message": "Invalid session ID"})),
        )
            .into_response()
    })
}

/// Request bodies that fail to parse are a validation problem for the user.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, QuizError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| QuizError::Validation(rejection.body_text()))
}

async fn index() -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Html(INDEX_HTML),
    )
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "persona-quiz",
    }))
}

/// POST /api/sessions
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    (StatusCode::CREATED, Json(state.controller.view(id).await))
}

/// GET /api/sessions/{id}
async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match parse_id(&id) {
        Ok(id) => Json(state.controller.view(id).await).into_response(),
        Err(resp) => resp,
    }
}

/// POST /api/sessions/{id}/start
async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ProfileForm>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let form = match json_body(body) {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };
    match state.controller.start(id, form).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/sessions/{id}/answer
async fn answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = match json_body(body) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };
    match state.controller.confirm(id, body.choice).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/sessions/{id}/report
async fn report(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.controller.report(id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/sessions/{id}/report/stream
///
/// Server-sent events: `chunk` per fragment, then `done` with the full
/// report, or a single `error` if the stream breaks.
async fn stream_report(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let events = match state.controller.stream_report(id).await {
        Ok(events) => events,
        Err(e) => return e.into_response(),
    };

    let sse = events.map(|item| {
        let event = match item {
            Ok(ReportEvent::Chunk { fragment, display }) => Event::default()
                .event("chunk")
                .data(json!({ "fragment": fragment, "display": display }).to_string()),
            Ok(ReportEvent::Done { report }) => Event::default()
                .event("done")
                .data(json!({ "report": report }).to_string()),
            Err(e) => Event::default()
                .event("error")
                .data(error_body(&e).to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(sse).keep_alive(KeepAlive::default()).into_response()
}

/// POST /api/sessions/{id}/restart
async fn restart(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match parse_id(&id) {
        Ok(id) => Json(state.controller.restart(id).await).into_response(),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::QuizConfig;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, TextStream};
    use crate::quiz::store::SessionStore;

    struct NoLlm;

    #[async_trait]
    impl LlmProvider for NoLlm {
        fn model_name(&self) -> &str {
            "none"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: "{}".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }

        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<TextStream, LlmError> {
            unimplemented!("not used in route tests")
        }
    }

    fn app() -> Router {
        let controller = StageController::new(
            SessionStore::new(),
            Arc::new(NoLlm),
            QuizConfig::default(),
        );
        quiz_routes(Arc::new(controller))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "persona-quiz");
    }

    #[tokio::test]
    async fn bad_session_id_is_rejected() {
        let resp = app()
            .oneshot(Request::get("/api/sessions/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_session_id");
    }

    #[tokio::test]
    async fn wrong_stage_maps_to_conflict() {
        let uri = format!("/api/sessions/{}/report", Uuid::new_v4());
        let resp = app()
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["error"], "wrong_stage");
    }

    #[tokio::test]
    async fn empty_form_maps_to_unprocessable() {
        let uri = format!("/api/sessions/{}/start", Uuid::new_v4());
        let resp = app()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"identity": "", "hobbies": ""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["error"], "validation");
    }

    #[tokio::test]
    async fn service_failure_maps_to_bad_gateway() {
        let uri = format!("/api/sessions/{}/start", Uuid::new_v4());
        let resp = app()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"identity": "nurse", "hobbies": "parks"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(resp).await["error"], "service");
    }

    #[tokio::test]
    async fn index_serves_the_quiz_page() {
        let resp = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("/api/sessions"));
        assert!(page.contains("/report/stream"));
    }

    #[tokio::test]
    async fn unknown_choice_is_a_validation_error() {
        let uri = format!("/api/sessions/{}/answer", Uuid::new_v4());
        let resp = app()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"choice": "c"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "validation");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn body_without_content_type_is_a_validation_error() {
        let uri = format!("/api/sessions/{}/start", Uuid::new_v4());
        let resp = app()
            .oneshot(
                Request::post(uri)
                    .body(Body::from(r#"{"identity": "nurse", "hobbies": "parks"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["error"], "validation");
    }
}
