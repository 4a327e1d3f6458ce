//! Administrative account endpoints, mounted under `/api/admin/accounts`.
//!
//! Every route here sits behind [`super::auth::require_staff`].

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{CurrentAccount, MessageResponse};
use super::validation::{
    ListAccountsQuery, validate_account_id, validate_page, validate_page_size,
};
use super::{AccountDetailDto, AccountListResponse, AccountRowDto, ApiError, ApiResponse, AppState};
use crate::services::{AccountChanges, NewAccount};

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    /// Force the owner to pick a new password at next login.
    #[serde(default)]
    pub must_change_password: bool,
}

async fn detail(
    state: &AppState,
    account: &crate::domain::Account,
) -> AccountDetailDto {
    let expired = state.account_service().is_password_expired(account).await;
    AccountDetailDto::new(account, expired)
}

/// `GET /api/admin/accounts`
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<ApiResponse<AccountListResponse>>, ApiError> {
    let page = validate_page(query.page)?;
    let page_size = validate_page_size(query.page_size)?;
    let filter = query.filter()?;

    let result = state
        .account_service()
        .list_accounts(&filter, page, page_size)
        .await?;

    Ok(Json(ApiResponse::success(AccountListResponse {
        accounts: result.accounts.iter().map(AccountRowDto::from).collect(),
        page,
        total: result.total,
        total_pages: result.total_pages,
    })))
}

/// `GET /api/admin/accounts/{id}`
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AccountDetailDto>>, ApiError> {
    let id = validate_account_id(id)?;
    let account = state.account_service().get_account(id).await?;
    Ok(Json(ApiResponse::success(detail(&state, &account).await)))
}

/// `POST /api/admin/accounts`
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAccount>,
) -> Result<(StatusCode, Json<ApiResponse<AccountDetailDto>>), ApiError> {
    let account = state.account_service().create_account(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(detail(&state, &account).await)),
    ))
}

/// `PUT /api/admin/accounts/{id}`
///
/// Partial update. A change that leaves `auth_mode` and `ad_enabled`
/// inconsistent is rejected with a 400 naming the `auth_mode` field.
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(changes): Json<AccountChanges>,
) -> Result<Json<ApiResponse<AccountDetailDto>>, ApiError> {
    let id = validate_account_id(id)?;
    let account = state.account_service().update_account(id, changes).await?;
    Ok(Json(ApiResponse::success(detail(&state, &account).await)))
}

/// `POST /api/admin/accounts/{id}/password`
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<AccountDetailDto>>, ApiError> {
    let id = validate_account_id(id)?;
    let account = state
        .account_service()
        .reset_password(id, &payload.new_password, payload.must_change_password)
        .await?;

    Ok(Json(ApiResponse::success(detail(&state, &account).await)))
}

/// `DELETE /api/admin/accounts/{id}`
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(current)): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_account_id(id)?;
    if current.id == id {
        return Err(ApiError::Conflict(
            "Cannot delete the account you are signed in with".to_string(),
        ));
    }

    state.account_service().delete_account(id).await?;
    tracing::info!(account_id = %id, deleted_by = %current, "Account deleted");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Account {id} deleted"),
    })))
}
