//! Health endpoints under `/api/system`. Both are reachable without an API key.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};
use crate::db::AccountFilter;

#[derive(Debug, Serialize)]
pub struct LivenessDto {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
    /// An active staff account exists, so the admin endpoints are usable.
    pub staff_account: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadinessDto {
    pub ready: bool,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub checks: ReadinessChecks,
}

/// `GET /api/system/health/live`
pub async fn health_live() -> impl IntoResponse {
    Json(ApiResponse::success(LivenessDto { status: "alive" }))
}

/// `GET /api/system/health/ready`
///
/// 503 until the store answers and at least one active staff account can
/// administer the others.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();

    let staff_filter = AccountFilter {
        is_staff: Some(true),
        is_active: Some(true),
        ..Default::default()
    };
    let staff_account = database
        && match state.store().list_accounts(&staff_filter, 1, 1).await {
            Ok(page) => page.total > 0,
            Err(err) => {
                tracing::warn!(error = %err, "Readiness check could not count staff accounts");
                false
            }
        };

    let ready = database && staff_account;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(ReadinessDto {
            ready,
            uptime_seconds: state.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
            checks: ReadinessChecks {
                database,
                staff_account,
            },
        })),
    )
        .into_response()
}
