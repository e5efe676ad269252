use std::{collections::BTreeMap, env, fs::read_to_string, io::ErrorKind, path::Path};

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::features::FeatureOverrides;

pub const CONFIG_FILE: &str = "commerce.config.json";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommerceConfig {
    #[serde(default)]
    pub features: Option<FeatureOverrides>,
    #[serde(default)]
    pub provider: Option<ProviderSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderSection {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

impl CommerceConfig {
    /// A missing or unreadable file yields the empty config.
    pub fn load(path: &Path) -> Self {
        let contents = match read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("{} not found, using provider defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                return Self::default();
            }
        };

        Self::parse(&contents, |key| env::var(key).ok())
    }

    pub fn parse(contents: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config: CommerceConfig = match serde_json::from_str(contents) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse {CONFIG_FILE}, using defaults: {e}");
                return Self::default();
            }
        };

        if let Some(provider) = config.provider.as_mut() {
            for value in provider.config.values_mut() {
                substitute_env(value, &lookup);
            }
        }

        config
    }

    pub fn overrides(&self) -> Option<&FeatureOverrides> {
        self.features.as_ref().filter(|overrides| !overrides.is_empty())
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|provider| provider.name.as_str())
    }

    pub fn provider_setting(&self, key: &str) -> Option<&str> {
        self.provider
            .as_ref()
            .and_then(|provider| provider.config.get(key))
            .and_then(Value::as_str)
    }
}

/// `"${VAR}"` becomes the value of `VAR` when it is set.
fn substitute_env(value: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    let Value::String(raw) = value else {
        return;
    };

    let Some(name) = raw
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return;
    };

    if let Some(resolved) = lookup(name) {
        *raw = resolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        (key == "API_URL").then(|| "https://shop.example/api".to_string())
    }

    #[test]
    fn test_env_substitution() {
        let config = CommerceConfig::parse(
            r#"{
                "features": {"cart": true},
                "provider": {
                    "name": "custom",
                    "config": {"baseUrl": "${API_URL}", "token": "${MISSING}", "retries": 3}
                }
            }"#,
            lookup,
        );

        assert_eq!(config.provider_name(), Some("custom"));
        assert_eq!(config.provider_setting("baseUrl"), Some("https://shop.example/api"));
        assert_eq!(config.provider_setting("token"), Some("${MISSING}"));
        assert_eq!(config.provider_setting("retries"), None);
        assert_eq!(config.overrides().and_then(|o| o.cart), Some(true));
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let config = CommerceConfig::parse("{ not json", lookup);

        assert_eq!(config, CommerceConfig::default());
        assert!(config.overrides().is_none());
    }

    #[test]
    fn test_empty_features_are_not_overrides() {
        let config = CommerceConfig::parse(r#"{"features": {}}"#, lookup);

        assert!(config.overrides().is_none());
    }

    #[test]
    fn test_missing_file() {
        let config = CommerceConfig::load(Path::new("/definitely/not/here/commerce.config.json"));

        assert_eq!(config, CommerceConfig::default());
    }
}
