use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::livekit::FailMode;
use crate::state::AppState;

/// Service information
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub message: String,
    pub version: String,
    pub livekit_url: String,
}

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub livekit: String,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(info))
        .route("/health", get(health_check))
}

/// GET / - Service information
async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        message: "LiveKit Video Calling Backend".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        livekit_url: state.config.livekit_url.clone(),
    })
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let database_status = match state.store.ping().await {
        Ok(true) => "connected",
        Ok(false) => "error",
        Err(_) => "disconnected",
    };

    let probe_timeout = Duration::from_millis(state.config.livekit_health_timeout_ms);
    let probe = state.rooms.provider_rooms(FailMode::Closed);
    let livekit_status = match tokio::time::timeout(probe_timeout, probe).await {
        Ok(Ok(_)) => "reachable",
        Ok(Err(_)) => "unreachable",
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.config.livekit_health_timeout_ms,
                "LiveKit health check timed out"
            );
            "unreachable"
        }
    };

    let overall_status = match (database_status, livekit_status) {
        ("connected", "reachable") => "healthy",
        ("connected", _) => "degraded",
        _ => "unhealthy",
    };

    Ok(Json(HealthResponse {
        status: overall_status.to_string(),
        database: database_status.to_string(),
        livekit: livekit_status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
