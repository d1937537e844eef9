use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub started_at: String,
}

/// `GET /`: plain liveness text.
pub async fn root() -> &'static str {
    "Bank Parser backend is running!"
}

/// `GET /api/health`
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        build: env!("LEDGERLIFT_BUILD_SHA"),
        started_at: state.started_at.to_rfc3339(),
    })
}
