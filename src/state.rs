use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::auth::{AuthError, TokenService};
use crate::config::{AppConfig, ConfigError};
use crate::store::{DataDir, RecordStore, StoreError};

pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const ITEMS: &str = "items";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared handler state, built once from an explicit [`AppConfig`]
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub data_dir: DataDir,
    pub users: RecordStore,
    pub products: RecordStore,
    pub items: RecordStore,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let tokens = TokenService::from_config(&config.security)?;
        let data_dir = DataDir::open(&config.storage.data_dir).await?;

        let users = data_dir.collection(USERS).await?;
        let products = data_dir.collection(PRODUCTS).await?;
        let items = data_dir.collection(ITEMS).await?;

        info!("Data directory: {}", data_dir.root().display());

        Ok(Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            data_dir,
            users,
            products,
            items,
        })
    }
}
