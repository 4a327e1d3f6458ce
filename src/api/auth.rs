use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::validate_username;
use super::{AccountDetailDto, ApiError, ApiResponse, AppState};
use crate::domain::{Account, AuthMode, AuthSource};

// ============================================================================
// Request/Response Types
// ============================================================================

/// The authenticated caller, inserted by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub api_key: String,
    pub auth_mode: AuthMode,
    pub must_change_password: bool,
    pub password_expired: bool,
    pub requires_password_change: bool,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware that checks:
/// 1. `X-Api-Key` header
/// 2. `Authorization: Bearer <api_key>` header
///
/// A store failure while resolving the key is a 500, not a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let Some(key) = extract_api_key(&headers) else {
        count_rejection("missing");
        return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
    };

    let account = match state.account_service().authenticate_api_key(&key).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            count_rejection("unknown");
            return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
        }
        Err(err) => {
            count_rejection("lookup_failed");
            return Err(err.into());
        }
    };

    let span = tracing::Span::current();
    span.record("account_id", account.id.value());
    span.record("username", account.identity.username.as_str());
    span.record("auth_mode", account.auth_mode.as_str());
    span.record(
        "auth_source",
        account
            .last_auth_source
            .as_ref()
            .map_or("NONE", AuthSource::as_str),
    );

    request.extensions_mut().insert(CurrentAccount(account));
    Ok(next.run(request).await.into_response())
}

fn count_rejection(reason: &'static str) {
    metrics::counter!("api_key_rejections_total", "reason" => reason).increment(1);
}

/// Rejects callers without the staff flag. Must run inside [`auth_middleware`].
pub async fn require_staff(request: Request, next: Next) -> Result<impl IntoResponse, ApiError> {
    let is_staff = request
        .extensions()
        .get::<CurrentAccount>()
        .is_some_and(|current| current.0.identity.is_staff);

    if !is_staff {
        return Err(ApiError::Forbidden(
            "Staff permission required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(api_key) = headers.get("X-Api-Key")
        && let Ok(key_str) = api_key.to_str()
    {
        return Some(key_str.to_string());
    }

    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with username and password, returns API key on success
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let username = validate_username(&payload.username)?;
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let outcome = state
        .account_service()
        .login(username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        requires_password_change: outcome.requires_password_change(),
        username: outcome.username,
        api_key: outcome.api_key,
        auth_mode: outcome.auth_mode,
        must_change_password: outcome.must_change_password,
        password_expired: outcome.password_expired,
    })))
}

/// GET /auth/me
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
) -> Json<ApiResponse<AccountDetailDto>> {
    let expired = state.account_service().is_password_expired(&account).await;
    Json(ApiResponse::success(AccountDetailDto::new(&account, expired)))
}

/// PUT /auth/password
/// Change password (requires current password verification)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .account_service()
        .change_password(
            &account.identity.username,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

/// POST /auth/api-key/regenerate
/// Generate a new random API key
pub async fn regenerate_api_key(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, ApiError> {
    let api_key = state
        .account_service()
        .regenerate_api_key(&account.identity.username)
        .await?;

    tracing::info!("API key regenerated for user: {account}");

    Ok(Json(ApiResponse::success(ApiKeyResponse { api_key })))
}
