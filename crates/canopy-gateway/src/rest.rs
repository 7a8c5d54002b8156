//! HTTP surface over the dispatcher
//!
//! - `POST /api/v1/submit/:function`   invoke and commit
//! - `POST /api/v1/evaluate/:function` invoke against a snapshot, discard writes
//! - `GET  /api/v1/functions`          callable function names
//! - `GET  /health`

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use canopy_common::{CanopyError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::dispatch::{Dispatcher, FUNCTIONS};

/// Caller used when a request names none
pub const ANONYMOUS_CALLER: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub caller: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub function: String,
    pub result: Value,
}

/// Error body: `{"error": "<CODE>", "message": "..."}`
pub struct ApiError(CanopyError);

impl From<CanopyError> for ApiError {
    fn from(e: CanopyError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::InsufficientData => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = Json(json!({
            "error": kind.code(),
            "message": self.0.to_string(),
        }));
        (status_for(kind), body).into_response()
    }
}

pub fn router(dispatcher: Dispatcher) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/functions", get(list_functions))
        .route("/api/v1/submit/:function", post(submit))
        .route("/api/v1/evaluate/:function", post(evaluate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(dispatcher)
}

async fn health_check(State(dispatcher): State<Dispatcher>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "height": dispatcher.ledger().store().height(),
    }))
}

async fn list_functions() -> Json<Vec<&'static str>> {
    Json(FUNCTIONS.to_vec())
}

async fn submit(
    State(dispatcher): State<Dispatcher>,
    Path(function): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let caller = req.caller.as_deref().unwrap_or(ANONYMOUS_CALLER);
    let result = dispatcher.submit(caller, &function, &req.args)?;
    Ok(Json(InvokeResponse { function, result }))
}

async fn evaluate(
    State(dispatcher): State<Dispatcher>,
    Path(function): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let caller = req.caller.as_deref().unwrap_or(ANONYMOUS_CALLER);
    let result = dispatcher.evaluate(caller, &function, &req.args)?;
    Ok(Json(InvokeResponse { function, result }))
}
