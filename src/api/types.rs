use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Account, AccountId, AuthMode, AuthSource};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Offending field for field-scoped validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            field: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            field: None,
        }
    }

    pub fn field_error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            ..Self::error(message)
        }
    }
}

/// One row of the admin account list.
#[derive(Debug, Serialize)]
pub struct AccountRowDto {
    pub id: AccountId,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_staff: bool,
    pub auth_mode: AuthMode,
    pub ad_enabled: bool,
    pub ad_identifier: Option<String>,
    pub last_auth_source: Option<AuthSource>,
}

impl From<&Account> for AccountRowDto {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.identity.username.clone(),
            email: account.identity.email.clone(),
            first_name: account.identity.first_name.clone(),
            last_name: account.identity.last_name.clone(),
            is_staff: account.identity.is_staff,
            auth_mode: account.auth_mode,
            ad_enabled: account.ad_enabled,
            ad_identifier: account.ad_identifier.clone(),
            last_auth_source: account.last_auth_source,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<AccountRowDto>,
    pub page: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Admin detail view, grouped the way the console renders it.
#[derive(Debug, Serialize)]
pub struct AccountDetailDto {
    pub id: AccountId,
    pub username: String,
    pub personal_info: PersonalInfoDto,
    pub permissions: PermissionsDto,
    pub authentication: AuthenticationDto,
    pub password: PasswordStatusDto,
    pub important_dates: ImportantDatesDto,
}

#[derive(Debug, Serialize)]
pub struct PersonalInfoDto {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PermissionsDto {
    pub is_active: bool,
    pub is_staff: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationDto {
    pub auth_mode: AuthMode,
    pub auth_mode_label: &'static str,
    pub ad_enabled: bool,
    pub ad_identifier: Option<String>,
    pub last_auth_source: Option<AuthSource>,
}

#[derive(Debug, Serialize)]
pub struct PasswordStatusDto {
    pub must_change_password: bool,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub password_never_expires: bool,
    pub password_expired: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportantDatesDto {
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountDetailDto {
    #[must_use]
    pub fn new(account: &Account, password_expired: bool) -> Self {
        Self {
            id: account.id,
            username: account.identity.username.clone(),
            personal_info: PersonalInfoDto {
                first_name: account.identity.first_name.clone(),
                last_name: account.identity.last_name.clone(),
                email: account.identity.email.clone(),
            },
            permissions: PermissionsDto {
                is_active: account.identity.is_active,
                is_staff: account.identity.is_staff,
            },
            authentication: AuthenticationDto {
                auth_mode: account.auth_mode,
                auth_mode_label: account.auth_mode.label(),
                ad_enabled: account.ad_enabled,
                ad_identifier: account.ad_identifier.clone(),
                last_auth_source: account.last_auth_source,
            },
            password: PasswordStatusDto {
                must_change_password: account.must_change_password,
                password_changed_at: account.password_changed_at(),
                password_never_expires: account.password_never_expires,
                password_expired,
            },
            important_dates: ImportantDatesDto {
                last_login_at: account.identity.last_login_at,
                created_at: account.identity.created_at,
                updated_at: account.updated_at,
            },
        }
    }
}
