//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{Config, PasswordPolicyConfig, SecurityConfig};
use crate::db::{AccountFilter, AccountPage, Store};
use crate::domain::{Account, AccountId, AuthSource, Identity, ValidationError};
use crate::services::account_service::{
    AccountChanges, AccountError, AccountService, LoginOutcome, NewAccount, blank_to_none,
};

const MAX_USERNAME_LEN: usize = 150;
const MAX_NAME_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 254;
const MAX_AD_IDENTIFIER_LEN: usize = 255;

pub struct SeaOrmAccountService {
    store: Store,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmAccountService {
    #[must_use]
    pub const fn new(store: Store, config: Arc<RwLock<Config>>) -> Self {
        Self { store, config }
    }

    async fn security(&self) -> SecurityConfig {
        self.config.read().await.security.clone()
    }

    async fn load(&self, id: AccountId) -> Result<Account, AccountError> {
        self.store
            .get_account(id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    async fn ensure_username_free(
        &self,
        username: &str,
        current: Option<AccountId>,
    ) -> Result<(), AccountError> {
        match self.store.get_account_by_username(username).await? {
            Some(existing) if Some(existing.id) != current => Err(AccountError::Conflict(format!(
                "Username '{username}' is already taken"
            ))),
            _ => Ok(()),
        }
    }
}

fn count_login(outcome: &'static str) {
    metrics::counter!("auth_logins_total", "outcome" => outcome, "source" => AuthSource::Local.as_str())
        .increment(1);
}

/// Field checks that apply to any account before it reaches the store.
fn check_fields(account: &Account) -> Result<(), ValidationError> {
    let username = &account.identity.username;
    if username.is_empty() {
        return Err(ValidationError::new("username", "Username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ValidationError::new(
            "username",
            format!("Username must be {MAX_USERNAME_LEN} characters or less"),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(ValidationError::new(
            "username",
            "Username can only contain letters, digits and @/./+/-/_",
        ));
    }

    let lengths = [
        ("email", account.identity.email.as_deref(), MAX_EMAIL_LEN),
        ("first_name", account.identity.first_name.as_deref(), MAX_NAME_LEN),
        ("last_name", account.identity.last_name.as_deref(), MAX_NAME_LEN),
        ("ad_identifier", account.ad_identifier.as_deref(), MAX_AD_IDENTIFIER_LEN),
    ];
    for (field, value, max) in lengths {
        if value.is_some_and(|v| v.chars().count() > max) {
            return Err(ValidationError::new(
                field,
                format!("{field} must be {max} characters or less"),
            ));
        }
    }

    Ok(())
}

fn check_new_password(
    policy: &PasswordPolicyConfig,
    new_password: &str,
) -> Result<(), ValidationError> {
    if new_password.chars().count() < policy.min_password_length {
        return Err(ValidationError::new(
            "new_password",
            format!(
                "New password must be at least {} characters",
                policy.min_password_length
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AccountError> {
        let Some(account) = self.store.get_account_by_username(username).await? else {
            count_login("invalid_credentials");
            return Err(AccountError::InvalidCredentials);
        };

        if !account.permits(AuthSource::Local) {
            count_login("directory_required");
            return Err(AccountError::DirectoryAuthRequired);
        }

        if !self.store.verify_user_password(username, password).await? {
            count_login("invalid_credentials");
            return Err(AccountError::InvalidCredentials);
        }

        if !account.identity.is_active {
            count_login("inactive");
            return Err(AccountError::Inactive);
        }

        self.store.record_login(account.id, AuthSource::Local).await?;
        count_login("success");

        let password_expired = self.is_password_expired(&account).await;
        let api_key = self
            .store
            .get_user_api_key(username)
            .await?
            .ok_or_else(|| AccountError::Internal("API key not found".to_string()))?;

        info!(username = %account, password_expired, "Local login succeeded");

        Ok(LoginOutcome {
            username: account.identity.username,
            api_key,
            auth_mode: account.auth_mode,
            must_change_password: account.must_change_password,
            password_expired,
        })
    }

    async fn authenticate_api_key(&self, api_key: &str) -> Result<Option<Account>, AccountError> {
        let account = self.store.verify_api_key(api_key).await?;
        Ok(account.filter(|a| a.identity.is_active))
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, AccountError> {
        self.load(id).await
    }

    async fn get_account_by_username(&self, username: &str) -> Result<Account, AccountError> {
        self.store
            .get_account_by_username(username)
            .await?
            .ok_or(AccountError::NotFound)
    }

    async fn is_password_expired(&self, account: &Account) -> bool {
        let max_age_days = self
            .config
            .read()
            .await
            .security
            .password_policy
            .max_password_age_days;
        account.is_password_expired(max_age_days)
    }

    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<Account, AccountError> {
        let security = self.security().await;
        check_new_password(&security.password_policy, new_password)?;

        if current_password == new_password {
            return Err(ValidationError::new(
                "new_password",
                "New password must be different from current password",
            )
            .into());
        }

        let account = self.get_account_by_username(username).await?;
        if !account.permits(AuthSource::Local) {
            return Err(AccountError::DirectoryAuthRequired);
        }

        if !self
            .store
            .verify_user_password(username, current_password)
            .await?
        {
            return Err(
                ValidationError::new("current_password", "Current password is incorrect").into(),
            );
        }

        let updated = self
            .store
            .set_account_password(account.id, new_password, false, &security)
            .await?;

        info!("Password changed for user: {updated}");
        Ok(updated)
    }

    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        page: u64,
        page_size: u64,
    ) -> Result<AccountPage, AccountError> {
        Ok(self.store.list_accounts(filter, page, page_size).await?)
    }

    async fn create_account(&self, input: NewAccount) -> Result<Account, AccountError> {
        let security = self.security().await;

        let mut identity = Identity::new(input.username.trim());
        identity.email = blank_to_none(input.email);
        identity.first_name = blank_to_none(input.first_name);
        identity.last_name = blank_to_none(input.last_name);
        identity.is_active = input.is_active;
        identity.is_staff = input.is_staff;

        let mut draft = Account::new(AccountId::default(), identity);
        draft.auth_mode = input.auth_mode;
        draft.ad_enabled = input.ad_enabled;
        draft.ad_identifier = blank_to_none(input.ad_identifier);
        draft.password_never_expires = input.password_never_expires;
        draft.must_change_password = input.must_change_password;

        check_fields(&draft)?;
        draft.validate()?;
        if let Some(password) = input.password.as_deref() {
            check_new_password(&security.password_policy, password)?;
        }
        self.ensure_username_free(&draft.identity.username, None)
            .await?;

        let created = self
            .store
            .create_account(draft, input.password.as_deref(), &security)
            .await?;

        info!(
            username = %created,
            auth_mode = %created.auth_mode,
            "Account created"
        );
        Ok(created)
    }

    async fn update_account(
        &self,
        id: AccountId,
        changes: AccountChanges,
    ) -> Result<Account, AccountError> {
        let mut account = self.load(id).await?;
        changes.apply(&mut account);

        check_fields(&account)?;
        account.validate()?;
        self.ensure_username_free(&account.identity.username, Some(id))
            .await?;

        Ok(self.store.save_account(&account).await?)
    }

    async fn reset_password(
        &self,
        id: AccountId,
        new_password: &str,
        must_change_password: bool,
    ) -> Result<Account, AccountError> {
        let security = self.security().await;
        check_new_password(&security.password_policy, new_password)?;

        let account = self.load(id).await?;
        let updated = self
            .store
            .set_account_password(account.id, new_password, must_change_password, &security)
            .await?;

        info!("Password reset for user: {updated}");
        Ok(updated)
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), AccountError> {
        if self.store.delete_account(id).await? {
            Ok(())
        } else {
            Err(AccountError::NotFound)
        }
    }

    async fn regenerate_api_key(&self, username: &str) -> Result<String, AccountError> {
        Ok(self.store.regenerate_user_api_key(username).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(username: &str) -> Account {
        Account::new(AccountId::new(1), Identity::new(username))
    }

    #[test]
    fn usernames_follow_login_identifier_rules() {
        assert!(check_fields(&account("jdoe")).is_ok());
        assert!(check_fields(&account("j.doe+ops@corp-1_x")).is_ok());

        let err = check_fields(&account("")).unwrap_err();
        assert_eq!(err.field, "username");
        let err = check_fields(&account("j doe")).unwrap_err();
        assert_eq!(err.field, "username");
        assert!(check_fields(&account(&"a".repeat(151))).is_err());
    }

    #[test]
    fn ad_identifier_is_free_text_with_length_cap() {
        let mut account = account("jdoe");
        account.ad_identifier = Some("CORP\\jdoe".to_string());
        assert!(check_fields(&account).is_ok());

        account.ad_identifier = Some("not really a upn".to_string());
        assert!(check_fields(&account).is_ok());

        account.ad_identifier = Some("x".repeat(256));
        let err = check_fields(&account).unwrap_err();
        assert_eq!(err.field, "ad_identifier");
    }

    #[tokio::test]
    async fn password_age_limit_is_read_from_live_config() {
        use chrono::{Duration, Utc};

        let db_path = std::env::temp_dir()
            .join(format!("umdm-service-test-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        let config = Arc::new(RwLock::new(Config::default()));
        let service = SeaOrmAccountService::new(store, config.clone());

        let mut account = account("jdoe");
        account.password_changed_at = Some(Utc::now() - Duration::days(10));

        config.write().await.security.password_policy.max_password_age_days = 90;
        assert!(!service.is_password_expired(&account).await);

        config.write().await.security.password_policy.max_password_age_days = 5;
        assert!(service.is_password_expired(&account).await);

        config.write().await.security.password_policy.max_password_age_days = 30;
        assert!(!service.is_password_expired(&account).await);
    }

    #[test]
    fn new_password_respects_min_length() {
        let policy = PasswordPolicyConfig::default();
        assert!(check_new_password(&policy, "NewPass123").is_ok());
        let err = check_new_password(&policy, "short").unwrap_err();
        assert_eq!(err.field, "new_password");
    }
}
