use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{BootstrapConfig, SecurityConfig};
use crate::domain::{Account, AccountId, AuthSource, Identity};

pub mod migrator;
pub mod repositories;

pub use repositories::user::{AccountFilter, AccountPage};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    /// Seeds a staff account when the users table is empty.
    ///
    /// The seeded account must change its password on first login.
    pub async fn ensure_bootstrap_admin(
        &self,
        bootstrap: &BootstrapConfig,
        security: &SecurityConfig,
    ) -> Result<bool> {
        let repo = self.user_repo();
        if repo.count().await? > 0 {
            return Ok(false);
        }

        let mut identity = Identity::new(bootstrap.admin_username.clone());
        identity.is_staff = true;
        let mut draft = Account::new(AccountId::default(), identity);
        draft.must_change_password = true;

        let admin = repo
            .create(draft, Some(&bootstrap.admin_password), security)
            .await?;

        info!("Seeded bootstrap admin account '{}'", admin.display_name());
        Ok(true)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn list_accounts(
        &self,
        filter: &AccountFilter,
        page: u64,
        page_size: u64,
    ) -> Result<AccountPage> {
        self.user_repo().list(filter, page, page_size).await
    }

    pub async fn create_account(
        &self,
        draft: Account,
        password: Option<&str>,
        security: &SecurityConfig,
    ) -> Result<Account> {
        self.user_repo().create(draft, password, security).await
    }

    pub async fn save_account(&self, account: &Account) -> Result<Account> {
        self.user_repo().save(account).await
    }

    pub async fn set_account_password(
        &self,
        id: AccountId,
        new_password: &str,
        must_change_password: bool,
        security: &SecurityConfig,
    ) -> Result<Account> {
        self.user_repo()
            .set_password(id, new_password, must_change_password, security)
            .await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn record_login(&self, id: AccountId, source: AuthSource) -> Result<()> {
        self.user_repo().record_login(id, source).await
    }

    pub async fn delete_account(&self, id: AccountId) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        self.user_repo().verify_api_key(api_key).await
    }

    pub async fn get_user_api_key(&self, username: &str) -> Result<Option<String>> {
        self.user_repo().get_api_key(username).await
    }

    pub async fn regenerate_user_api_key(&self, username: &str) -> Result<String> {
        self.user_repo().regenerate_api_key(username).await
    }
}
