use std::sync::Arc;

use anyhow::Result;
use commerce::{Commerce, CommerceConfig, api::ApiClient};
use tracing::info;

use super::{
    cart::CartSessions,
    config::{self, Config},
};

pub struct State {
    pub config: Config,
    pub commerce: Commerce,
    pub carts: CartSessions,
    /// Customer backend, for calls that bypass the provider.
    pub backend: ApiClient,
    pub admin_backend: ApiClient,
}

impl State {
    pub fn new(config: Config, commerce: Commerce) -> Arc<Self> {
        Arc::new(Self {
            backend: ApiClient::new(config.custom_api_base_url.clone()),
            admin_backend: ApiClient::new(config.admin_api_base_url.clone()),
            carts: CartSessions::default(),
            config,
            commerce,
        })
    }

    pub fn init() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let commerce_config = CommerceConfig::load(&config.commerce_config_path);
        let commerce = Commerce::from_config(&commerce_config, config::lookup)?;

        info!(
            "Environment: {:?}, backend: {}",
            config.environment, config.custom_api_base_url
        );

        Ok(Self::new(config, commerce))
    }
}
