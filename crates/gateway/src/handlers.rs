use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use reverie_engine::error::EngineError;
use reverie_engine::orchestrator::{CardRequest, Engine};
use reverie_engine::recommend::RecommendRequest;
use reverie_engine::synthesis::SynthesisRequest;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/card", post(card))
        .route("/api/synthesis", post(synthesis))
        .route("/api/recommend", post(recommend))
        .route("/api/title", post(title))
        .with_state(AppState { engine })
}

async fn health() -> &'static str {
    "ok"
}

/// Input problems are the caller's (400); everything else means the model
/// upstream let us down (502).
fn error_response(err: EngineError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    tracing::warn!(error = %err, status = %status.as_u16(), "request failed");
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn card(State(state): State<AppState>, Json(req): Json<CardRequest>) -> Response {
    match state.engine.next_card(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

async fn synthesis(State(state): State<AppState>, Json(req): Json<SynthesisRequest>) -> Response {
    match state.engine.synthesize(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

async fn recommend(State(state): State<AppState>, Json(req): Json<RecommendRequest>) -> Response {
    match state.engine.recommend(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct TitleRequest {
    #[serde(default)]
    narrative: String,
}

async fn title(State(state): State<AppState>, Json(req): Json<TitleRequest>) -> Response {
    if req.narrative.trim().is_empty() {
        return error_response(EngineError::MissingField("narrative"));
    }
    let title = state.engine.title(&req.narrative).await;
    Json(json!({ "title": title })).into_response()
}
