//! Commerce domain for the storefront: catalog and cart types, feature flags,
//! and the pluggable providers (local, custom REST, Shopify) behind them.
pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod features;
pub mod provider;
pub mod providers;
pub mod sorting;
pub mod transform;
pub mod types;

pub use config::CommerceConfig;
pub use error::{ApiError, CommerceError, Result};
pub use features::{CommerceFeatures, Feature, FeatureOverrides};
pub use provider::{Commerce, CommerceProvider, ProviderKind, Revalidation};
