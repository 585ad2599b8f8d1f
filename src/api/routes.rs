//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use super::state::AppState;
use crate::detect::{AnomalyEngine, DetectError, DetectionWindow};
use crate::month::Month;
use crate::storage;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/thresholds", get(thresholds))
        .route("/anomalies", get(anomalies))
}

enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn thresholds(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": state.thresholds,
        "meta": { "expected_packages": state.expected_packages }
    }))
}

#[derive(Debug, Deserialize)]
struct AnomalyQuery {
    month: Option<String>,
}

async fn anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomalyQuery>,
) -> Result<Json<Value>, ApiError> {
    let target = match query.month.as_deref() {
        Some(raw) => raw
            .parse::<Month>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => Month::current(),
    };
    let window = DetectionWindow::for_target(target, state.thresholds.lookback_months);
    let run_id = Uuid::new_v4();
    let extreme = state.thresholds.extreme_growth_threshold;

    let result = tokio::task::spawn_blocking(move || {
        storage::with_snapshot(&state.pool, |store| {
            AnomalyEngine::new(store, state.thresholds, state.expected_packages.clone())
                .detect_window(&window)
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("detection task failed: {}", e)))?
    .map_err(|e: DetectError| {
        error!(%run_id, error = %e, "anomaly detection failed");
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(json!({
        "data": result,
        "meta": {
            "run_id": run_id,
            "target_month": window.target_month,
            "baseline_start": window.baseline_start,
            "baseline_end": window.baseline_end,
            "severity": result.severity(extreme),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    })))
}
