use axum::{extract::State, Json};
use shared::{ApiResponse, HealthStatus};

use crate::{db::now_timestamp, state::AppState};

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::ok(HealthStatus {
        status: "ok".to_string(),
        message: "WhatTime API is running".to_string(),
        timestamp: now_timestamp(),
        environment: state.config.server.environment.clone(),
    }))
}
