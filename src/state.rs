use std::sync::Arc;

use crate::auth::idp::IdentityProvider;
use crate::auth::tokens::TokenService;
use crate::config::AppConfig;
use crate::db::Db;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub tokens: TokenService,
    pub idp: IdentityProvider,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        Self::from_config(config).await
    }

    /// Builds every component from one configuration snapshot. Also used
    /// by tests to stand up a state over a throwaway database.
    pub async fn from_config(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let db = Db::connect(&config.database).await?;
        db.init_schema().await?;
        let tokens = TokenService::new(&config.token);
        let idp = IdentityProvider::new(&config.idp);
        Ok(Self {
            db,
            tokens,
            idp,
            config,
        })
    }
}
