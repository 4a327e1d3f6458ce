//! Request logging, HTTP metrics and response hardening for the account API.

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::api::AppState;

/// `GET /api/metrics`
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Buckets a request path into the API area it belongs to.
///
/// Accepts the path with or without the `/api` mount prefix.
pub(crate) fn route_group(path: &str) -> &'static str {
    let path = path.strip_prefix("/api").unwrap_or(path);
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    match first {
        "auth" => "auth",
        "admin" => "admin",
        "system" => "system",
        "metrics" => "metrics",
        _ => "other",
    }
}

/// Opens the `request` span that handlers and the auth layer record into.
///
/// `account_id`, `username`, `auth_mode` and `auth_source` start empty and
/// are filled by [`super::auth::auth_middleware`] once an API key resolves.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());
    let group = route_group(route.as_deref().unwrap_or_else(|| req.uri().path()));

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %req.uri().path(),
        route = route.clone(),
        group,
        account_id = tracing::field::Empty,
        username = tracing::field::Empty,
        auth_mode = tracing::field::Empty,
        auth_source = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;
        let status = response.status().as_u16();

        // unmatched paths share one label value
        let labels = [
            ("method", method),
            ("group", group.to_string()),
            ("route", route.unwrap_or_else(|| "unmatched".to_string())),
            ("status", status.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if status >= 500 {
            tracing::error!(status_code = status, duration_ms, "Request failed");
        } else if matches!(status, 401 | 403) && group == "admin" {
            tracing::warn!(status_code = status, duration_ms, "Admin request refused");
        } else {
            info!(status_code = status, duration_ms, "Request finished");
        }

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    // account payloads carry API keys and personal data
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}
