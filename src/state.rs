use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AccountService, SeaOrmAccountService};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub account_service: Arc<dyn AccountService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        store
            .ensure_bootstrap_admin(&config.bootstrap, &config.security)
            .await?;

        let config = Arc::new(RwLock::new(config));

        let account_service = Arc::new(SeaOrmAccountService::new(store.clone(), config.clone()))
            as Arc<dyn AccountService>;

        Ok(Self {
            config,
            store,
            account_service,
        })
    }
}
