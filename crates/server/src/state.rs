use anyhow::Result;
use std::sync::Arc;

use crate::{
    auth::{microsoft::MicrosoftClient, TokenService},
    config::Config,
    db::Database,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    /// Present only when the Microsoft app registration is configured
    pub microsoft: Option<Arc<MicrosoftClient>>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let tokens = Arc::new(TokenService::new(&config.auth)?);
        let microsoft = config
            .microsoft
            .clone()
            .map(|ms| Arc::new(MicrosoftClient::new(ms)));

        Ok(Self {
            db,
            config,
            tokens,
            microsoft,
        })
    }
}
