use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use commerce::{api::DEFAULT_API_BASE_URL, config::CONFIG_FILE, providers::CUSTOM_API_VAR};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("development") | Some("dev") => Environment::Development,
            _ => Environment::Production,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub custom_api_base_url: String,
    pub admin_api_base_url: String,
    pub commerce_config_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let custom_api_base_url = lookup(CUSTOM_API_VAR).unwrap_or_else(|| {
            info!("{CUSTOM_API_VAR} not set, using default: {DEFAULT_API_BASE_URL}");
            DEFAULT_API_BASE_URL.to_string()
        });

        let admin_api_base_url = lookup("ADMIN_API_BASE_URL")
            .unwrap_or_else(|| custom_api_base_url.replacen("/api", "/api/admin", 1));

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "1111")?,
            environment: Environment::parse(lookup("APP_ENV").as_deref()),
            admin_api_base_url,
            custom_api_base_url,
            commerce_config_path: lookup("COMMERCE_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE)),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Cookies are only marked `Secure` outside development.
    pub fn secure_cookies(&self) -> bool {
        !self.is_development()
    }
}

/// Environment variable first, then a mounted secret of the same name.
pub fn lookup(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| read_secret(key))
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {secret_name} from file: {e}");
            }
        })
        .ok()
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }
    })
}
