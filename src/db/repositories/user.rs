use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::domain::{Account, AccountId, AuthMode, AuthSource, CredentialHasher, Identity};
use crate::entities::users;

/// Stored in place of a hash for accounts that cannot log in with a password.
pub const UNUSABLE_PASSWORD: &str = "!";

/// Admin list filters. `None` means "don't filter on this column".
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub auth_mode: Option<AuthMode>,
    pub ad_enabled: Option<bool>,
    pub last_auth_source: Option<AuthSource>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
    /// Free text matched against username, names, email and AD identifier.
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    pub total: u64,
    pub total_pages: u64,
}

impl TryFrom<users::Model> for Account {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self> {
        let identity = Identity {
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            is_active: model.is_active,
            is_staff: model.is_staff,
            created_at: parse_timestamp(&model.created_at)?,
            last_login_at: model.last_login_at.as_deref().map(parse_timestamp).transpose()?,
        };

        let mut account = Self::new(AccountId::new(model.id), identity);
        account.auth_mode = model.auth_mode.parse()?;
        account.ad_enabled = model.ad_enabled;
        account.ad_identifier = model.ad_identifier;
        account.last_auth_source = model
            .last_auth_source
            .as_deref()
            .map(str::parse)
            .transpose()?;
        account.must_change_password = model.must_change_password;
        account.password_changed_at = model
            .password_changed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        account.password_never_expires = model.password_never_expires;
        account.updated_at = parse_timestamp(&model.updated_at)?;

        Ok(account)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {value}"))
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        user.map(Account::try_from).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        let user = self.find_model_by_username(username).await?;
        user.map(Account::try_from).transpose()
    }

    pub async fn list(
        &self,
        filter: &AccountFilter,
        page: u64,
        page_size: u64,
    ) -> Result<AccountPage> {
        let mut query = users::Entity::find().order_by_asc(users::Column::Username);

        if let Some(mode) = filter.auth_mode {
            query = query.filter(users::Column::AuthMode.eq(mode.as_str()));
        }

        if let Some(ad_enabled) = filter.ad_enabled {
            query = query.filter(users::Column::AdEnabled.eq(ad_enabled));
        }

        if let Some(source) = filter.last_auth_source {
            query = query.filter(users::Column::LastAuthSource.eq(source.as_str()));
        }

        if let Some(is_staff) = filter.is_staff {
            query = query.filter(users::Column::IsStaff.eq(is_staff));
        }

        if let Some(is_active) = filter.is_active {
            query = query.filter(users::Column::IsActive.eq(is_active));
        }

        if let Some(term) = filter.search.as_deref().map(str::trim)
            && !term.is_empty()
        {
            query = query.filter(
                Condition::any()
                    .add(users::Column::Username.contains(term))
                    .add(users::Column::FirstName.contains(term))
                    .add(users::Column::LastName.contains(term))
                    .add(users::Column::Email.contains(term))
                    .add(users::Column::AdIdentifier.contains(term)),
            );
        }

        let paginator = query.paginate(&self.conn, page_size);
        let totals = paginator
            .num_items_and_pages()
            .await
            .context("Failed to count users")?;
        let models = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .context("Failed to list users")?;

        let accounts = models
            .into_iter()
            .map(Account::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(AccountPage {
            accounts,
            total: totals.number_of_items,
            total_pages: totals.number_of_pages,
        })
    }

    /// Inserts a new account. The id of `draft` is ignored.
    ///
    /// Without a password the account gets an unusable credential and keeps
    /// `password_changed_at` unset. The draft's `must_change_password` is
    /// kept either way.
    pub async fn create(
        &self,
        draft: Account,
        password: Option<&str>,
        config: &SecurityConfig,
    ) -> Result<Account> {
        draft.validate()?;

        let must_change_password = draft.must_change_password;
        let (draft, password_hash) = match password {
            Some(password) => {
                hash_for_account(draft, password, must_change_password, config).await?
            }
            None => (draft, UNUSABLE_PASSWORD.to_string()),
        };

        let now = Utc::now().to_rfc3339();
        let active = users::ActiveModel {
            username: Set(draft.identity.username.clone()),
            password_hash: Set(password_hash),
            api_key: Set(generate_api_key()),
            email: Set(draft.identity.email.clone()),
            first_name: Set(draft.identity.first_name.clone()),
            last_name: Set(draft.identity.last_name.clone()),
            is_active: Set(draft.identity.is_active),
            is_staff: Set(draft.identity.is_staff),
            auth_mode: Set(draft.auth_mode.as_str().to_string()),
            ad_enabled: Set(draft.ad_enabled),
            ad_identifier: Set(draft.ad_identifier.clone()),
            last_auth_source: Set(None),
            must_change_password: Set(draft.must_change_password),
            password_changed_at: Set(draft.password_changed_at().map(|t| t.to_rfc3339())),
            password_never_expires: Set(draft.password_never_expires),
            last_login_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .with_context(|| format!("Failed to insert user {}", draft.identity.username))?;

        Account::try_from(model)
    }

    /// Persists administrative edits after validating the account.
    ///
    /// The password lifecycle timestamp and authentication audit fields are
    /// not written here; they have their own operations.
    pub async fn save(&self, account: &Account) -> Result<Account> {
        account.validate()?;

        let user = users::Entity::find_by_id(account.id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {}", account.id))?;

        let mut active: users::ActiveModel = user.into();
        active.username = Set(account.identity.username.clone());
        active.email = Set(account.identity.email.clone());
        active.first_name = Set(account.identity.first_name.clone());
        active.last_name = Set(account.identity.last_name.clone());
        active.is_active = Set(account.identity.is_active);
        active.is_staff = Set(account.identity.is_staff);
        active.auth_mode = Set(account.auth_mode.as_str().to_string());
        active.ad_enabled = Set(account.ad_enabled);
        active.ad_identifier = Set(account.ad_identifier.clone());
        active.must_change_password = Set(account.must_change_password);
        active.password_never_expires = Set(account.password_never_expires);
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Account::try_from(model)
    }

    /// Replaces the password and its lifecycle fields in a single update.
    ///
    /// `must_change_password` is written alongside the new hash.
    pub async fn set_password(
        &self,
        id: AccountId,
        new_password: &str,
        must_change_password: bool,
        config: &SecurityConfig,
    ) -> Result<Account> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let account = Account::try_from(user.clone())?;
        let (account, new_hash) = hash_for_account(account, new_password, must_change_password, config).await?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.password_changed_at = Set(account.password_changed_at().map(|t| t.to_rfc3339()));
        active.must_change_password = Set(account.must_change_password);
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Account::try_from(model)
    }

    /// Verify password for a user
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        let Some(user) = self.find_model_by_username(username).await? else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        if password_hash.starts_with(UNUSABLE_PASSWORD) {
            return Ok(false);
        }

        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Audit write performed by the authentication backend after a successful login.
    pub async fn record_login(&self, id: AccountId, source: AuthSource) -> Result<()> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for login audit")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let now = Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.last_auth_source = Set(Some(source.as_str().to_string()));
        active.last_login_at = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn delete(&self, id: AccountId) -> Result<bool> {
        let result = users::Entity::delete_by_id(id.value())
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected > 0)
    }

    /// Verify API key and return the associated account
    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::ApiKey.eq(api_key))
            .one(&self.conn)
            .await
            .context("Failed to query user by API key")?;

        user.map(Account::try_from).transpose()
    }

    pub async fn get_api_key(&self, username: &str) -> Result<Option<String>> {
        let user = self.find_model_by_username(username).await?;
        Ok(user.map(|u| u.api_key))
    }

    pub async fn regenerate_api_key(&self, username: &str) -> Result<String> {
        let user = self
            .find_model_by_username(username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {username}"))?;

        let new_api_key = generate_api_key();
        let now = Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.api_key = Set(new_api_key.clone());
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(new_api_key)
    }

    async fn find_model_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }
}

/// Runs `Account::set_password` with the argon2 hasher off the async runtime,
/// then applies the forced-change flag for the same row write.
async fn hash_for_account(
    mut account: Account,
    password: &str,
    must_change_password: bool,
    config: &SecurityConfig,
) -> Result<(Account, String)> {
    let password = password.to_string();
    let hasher = Argon2Hasher::new(config.clone());

    task::spawn_blocking(move || {
        let hash = account.set_password(&hasher, &password)?;
        account.must_change_password = must_change_password;
        Ok::<_, anyhow::Error>((account, hash))
    })
    .await
    .context("Password hashing task panicked")?
}

/// Argon2id credential hasher configured from [`SecurityConfig`].
pub struct Argon2Hasher {
    config: SecurityConfig,
}

impl Argon2Hasher {
    #[must_use]
    pub const fn new(config: SecurityConfig) -> Self {
        Self { config }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, raw_password: &str) -> Result<String> {
        hash_password(raw_password, Some(&self.config))
    }
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default (high memory) params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None, // output length (use default)
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Generate a random API key (64 character hex string)
#[must_use]
pub fn generate_api_key() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn argon2_hasher_produces_verifiable_hash() {
        let hasher = Argon2Hasher::new(fast_config());
        let encoded = hasher.hash("NewPass123").unwrap();
        assert!(encoded.starts_with("$argon2id$"));

        let parsed = PasswordHash::new(&encoded).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"NewPass123", &parsed)
                .is_ok()
        );
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }

    #[tokio::test]
    async fn hashing_keeps_requested_forced_change_flag() {
        let account = Account::new(AccountId::new(1), Identity::new("jdoe"));

        let (forced, hash) = hash_for_account(account.clone(), "NewPass123", true, &fast_config())
            .await
            .unwrap();
        assert!(forced.must_change_password);
        assert!(forced.password_changed_at().is_some());
        assert!(hash.starts_with("$argon2id$"));

        let (cleared, _) = hash_for_account(forced, "Other456!", false, &fast_config())
            .await
            .unwrap();
        assert!(!cleared.must_change_password);
    }

    #[test]
    fn api_keys_are_random_hex() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn model_conversion_rejects_unknown_auth_mode() {
        let now = Utc::now().to_rfc3339();
        let model = users::Model {
            id: 1,
            username: "jdoe".to_string(),
            password_hash: UNUSABLE_PASSWORD.to_string(),
            api_key: "k".to_string(),
            email: None,
            first_name: None,
            last_name: None,
            is_active: true,
            is_staff: false,
            auth_mode: "KERBEROS".to_string(),
            ad_enabled: false,
            ad_identifier: None,
            last_auth_source: None,
            must_change_password: false,
            password_changed_at: None,
            password_never_expires: false,
            last_login_at: None,
            created_at: now.clone(),
            updated_at: now,
        };

        assert!(Account::try_from(model.clone()).is_err());

        let account = Account::try_from(users::Model {
            auth_mode: "LOCAL_OR_AD".to_string(),
            ad_enabled: true,
            last_auth_source: Some("AD".to_string()),
            ..model
        })
        .unwrap();
        assert_eq!(account.auth_mode, AuthMode::LocalOrAd);
        assert_eq!(account.last_auth_source, Some(AuthSource::Ad));
    }
}
