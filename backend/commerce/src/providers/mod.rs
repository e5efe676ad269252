pub mod custom;
pub mod local;
pub mod shopify;

use std::{path::Path, sync::Arc};

use tracing::{info, warn};

use crate::{
    api::{ApiClient, DEFAULT_API_BASE_URL},
    config::CommerceConfig,
    error::Result,
    provider::{Commerce, CommerceProvider, ProviderKind},
};

use custom::CustomProvider;
use local::LocalProvider;
use shopify::{
    ACCESS_TOKEN_VAR, REVALIDATION_SECRET_VAR, STORE_DOMAIN_VAR, ShopifyProvider, ShopifySettings,
};

pub const PROVIDER_VAR: &str = "COMMERCE_PROVIDER";
pub const CUSTOM_API_VAR: &str = "CUSTOM_API_BASE_URL";
pub const LOCAL_CATALOG_VAR: &str = "LOCAL_CATALOG_PATH";

/// `provider.config` keys and the variables they stand in for.
const SETTING_KEYS: [(&str, &str); 5] = [
    ("baseUrl", CUSTOM_API_VAR),
    ("catalogPath", LOCAL_CATALOG_VAR),
    ("storeDomain", STORE_DOMAIN_VAR),
    ("accessToken", ACCESS_TOKEN_VAR),
    ("revalidationSecret", REVALIDATION_SECRET_VAR),
];

/// Settings from `provider.config` win over the environment.
fn setting(
    config: &CommerceConfig,
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Option<String> {
    SETTING_KEYS
        .iter()
        .find(|(_, name)| *name == var)
        .and_then(|(key, _)| config.provider_setting(key))
        .map(str::to_string)
        .or_else(|| lookup(var))
        .filter(|value| !value.trim().is_empty())
}

pub fn build_provider(
    kind: ProviderKind,
    config: &CommerceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn CommerceProvider>> {
    let provider: Arc<dyn CommerceProvider> = match kind {
        ProviderKind::Local => match setting(config, &lookup, LOCAL_CATALOG_VAR) {
            Some(path) => match LocalProvider::from_file(Path::new(&path)) {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    warn!("{e}, using the built-in catalog");
                    Arc::new(LocalProvider::builtin())
                }
            },
            None => Arc::new(LocalProvider::builtin()),
        },
        ProviderKind::Custom => {
            let base_url = setting(config, &lookup, CUSTOM_API_VAR)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
            info!("Custom backend at {base_url}");
            Arc::new(CustomProvider::new(ApiClient::new(base_url)))
        }
        ProviderKind::Shopify => {
            let settings = ShopifySettings::from_lookup(|var| setting(config, &lookup, var))?;
            Arc::new(ShopifyProvider::new(settings))
        }
    };

    Ok(provider)
}

impl Commerce {
    /// Picks the provider named by the environment, then the config file, then `local`.
    pub fn from_config(
        config: &CommerceConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let name = lookup(PROVIDER_VAR).or_else(|| config.provider_name().map(str::to_string));
        let kind = ProviderKind::select(name.as_deref());

        let provider = build_provider(kind, config, lookup)?;

        Ok(Commerce::new(provider, config.overrides()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{error::CommerceError, features::Feature};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_local() {
        let commerce = Commerce::from_config(&CommerceConfig::default(), lookup(&[])).unwrap();

        assert_eq!(commerce.provider().name(), "local");
        assert!(commerce.is_enabled(Feature::Search));
        assert!(!commerce.is_enabled(Feature::Cart));
    }

    #[test]
    fn test_env_wins_over_config_file() {
        let config = CommerceConfig::parse(
            r#"{"provider": {"name": "shopify"}, "features": {"wishlist": false}}"#,
            |_| None,
        );

        let commerce =
            Commerce::from_config(&config, lookup(&[(PROVIDER_VAR, "custom")])).unwrap();
        assert_eq!(commerce.provider().name(), "custom");
        assert!(commerce.is_enabled(Feature::Cart));
        assert!(!commerce.is_enabled(Feature::Wishlist));
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let commerce =
            Commerce::from_config(&CommerceConfig::default(), lookup(&[(PROVIDER_VAR, "magento")]))
                .unwrap();

        assert_eq!(commerce.provider().name(), "local");
    }

    #[test]
    fn test_shopify_needs_credentials() {
        let err = Commerce::from_config(
            &CommerceConfig::default(),
            lookup(&[(PROVIDER_VAR, "shopify")]),
        )
        .unwrap_err();
        assert!(matches!(err, CommerceError::Misconfigured(_)));

        let config = CommerceConfig::parse(
            r#"{"provider": {"name": "shopify", "config": {"storeDomain": "${DOMAIN}"}}}"#,
            |key| (key == "DOMAIN").then(|| "shop.example.com".to_string()),
        );
        let commerce =
            Commerce::from_config(&config, lookup(&[(ACCESS_TOKEN_VAR, "token")])).unwrap();
        assert_eq!(commerce.provider().name(), "shopify");
    }

    #[test]
    fn test_bad_snapshot_uses_builtin() {
        let commerce = Commerce::from_config(
            &CommerceConfig::default(),
            lookup(&[(LOCAL_CATALOG_VAR, "/nonexistent/catalog.json")]),
        )
        .unwrap();

        assert_eq!(commerce.provider().name(), "local");
    }
}
