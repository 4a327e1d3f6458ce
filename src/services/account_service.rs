//! Domain service for accounts: local login, password lifecycle and the
//! administrative CRUD surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{AccountFilter, AccountPage};
use crate::domain::{Account, AccountId, AuthMode, ValidationError};

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not found")]
    NotFound,

    #[error("Account is disabled")]
    Inactive,

    #[error("Account must authenticate against the directory")]
    DirectoryAuthRequired,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ValidationError>() {
            Ok(validation) => Self::Validation(validation),
            Err(err) => Self::Internal(format!("{err:#}")),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Provisioning input. Omitted fields take the account defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub username: String,
    /// Without a password the account cannot log in locally.
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub ad_enabled: bool,
    pub ad_identifier: Option<String>,
    #[serde(default)]
    pub must_change_password: bool,
    #[serde(default)]
    pub password_never_expires: bool,
}

/// Administrative edit. `None` leaves a field unchanged; for optional text
/// fields an empty string clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub auth_mode: Option<AuthMode>,
    pub ad_enabled: Option<bool>,
    pub ad_identifier: Option<String>,
    pub must_change_password: Option<bool>,
    pub password_never_expires: Option<bool>,
}

impl AccountChanges {
    pub fn apply(self, account: &mut Account) {
        if let Some(username) = self.username {
            account.identity.username = username.trim().to_string();
        }
        if let Some(email) = self.email {
            account.identity.email = blank_to_none(Some(email));
        }
        if let Some(first_name) = self.first_name {
            account.identity.first_name = blank_to_none(Some(first_name));
        }
        if let Some(last_name) = self.last_name {
            account.identity.last_name = blank_to_none(Some(last_name));
        }
        if let Some(is_active) = self.is_active {
            account.identity.is_active = is_active;
        }
        if let Some(is_staff) = self.is_staff {
            account.identity.is_staff = is_staff;
        }
        if let Some(auth_mode) = self.auth_mode {
            account.auth_mode = auth_mode;
        }
        if let Some(ad_enabled) = self.ad_enabled {
            account.ad_enabled = ad_enabled;
        }
        if let Some(ad_identifier) = self.ad_identifier {
            account.ad_identifier = blank_to_none(Some(ad_identifier));
        }
        if let Some(must_change_password) = self.must_change_password {
            account.must_change_password = must_change_password;
        }
        if let Some(password_never_expires) = self.password_never_expires {
            account.password_never_expires = password_never_expires;
        }
    }
}

pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Result of a successful local login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub username: String,
    pub api_key: String,
    pub auth_mode: AuthMode,
    pub must_change_password: bool,
    pub password_expired: bool,
}

impl LoginOutcome {
    /// The client has to run the password-change flow before doing anything else.
    #[must_use]
    pub const fn requires_password_change(&self) -> bool {
        self.must_change_password || self.password_expired
    }
}

#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Verifies a local password login and records `LOCAL` as the auth source.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::DirectoryAuthRequired`] when the account's
    /// auth mode does not permit local passwords.
    async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AccountError>;

    /// Resolves an API key to an active account.
    async fn authenticate_api_key(&self, api_key: &str) -> Result<Option<Account>, AccountError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, AccountError>;

    async fn get_account_by_username(&self, username: &str) -> Result<Account, AccountError>;

    /// Expiry against the currently configured maximum password age.
    async fn is_password_expired(&self, account: &Account) -> bool;

    /// Self-service password change; the current password must verify.
    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<Account, AccountError>;

    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        page: u64,
        page_size: u64,
    ) -> Result<AccountPage, AccountError>;

    async fn create_account(&self, input: NewAccount) -> Result<Account, AccountError>;

    /// Applies an administrative edit; rejected when the result fails validation.
    async fn update_account(
        &self,
        id: AccountId,
        changes: AccountChanges,
    ) -> Result<Account, AccountError>;

    /// Administrative password reset. `must_change_password` is stored in the
    /// same write as the new hash.
    async fn reset_password(
        &self,
        id: AccountId,
        new_password: &str,
        must_change_password: bool,
    ) -> Result<Account, AccountError>;

    async fn delete_account(&self, id: AccountId) -> Result<(), AccountError>;

    async fn regenerate_api_key(&self, username: &str) -> Result<String, AccountError>;
}
