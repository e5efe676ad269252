use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    error::{CommerceError, Result},
    features::{CommerceFeatures, Feature, FeatureOverrides},
    types::{
        AuthSession, Cart, CartLineInput, CartLineUpdate, CheckoutRequest, Collection,
        CollectionQuery, Credentials, Menu, Order, Page, Product, ProductQuery, Registration,
        Session, User,
    },
};

/// Outcome of a provider webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revalidation {
    pub status: u16,
    pub revalidated: bool,
}

impl Revalidation {
    pub fn ignored() -> Self {
        Self {
            status: 200,
            revalidated: false,
        }
    }
}

/// A commerce backend. Every storefront read and write goes through one of these.
#[async_trait]
pub trait CommerceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn features(&self) -> CommerceFeatures;

    async fn get_product(&self, handle: &str) -> Result<Option<Product>>;
    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<Product>>;
    async fn get_product_recommendations(&self, product_id: &str) -> Result<Vec<Product>>;

    async fn get_collection(&self, handle: &str) -> Result<Option<Collection>>;
    async fn get_collections(&self) -> Result<Vec<Collection>>;
    async fn get_collection_products(&self, query: &CollectionQuery) -> Result<Vec<Product>>;

    async fn get_cart(&self, session: &Session) -> Result<Option<Cart>>;
    async fn create_cart(&self, session: &Session) -> Result<Cart>;
    async fn add_to_cart(&self, session: &Session, lines: &[CartLineInput]) -> Result<Cart>;
    async fn remove_from_cart(&self, session: &Session, line_ids: &[String]) -> Result<Cart>;
    async fn update_cart(&self, session: &Session, lines: &[CartLineUpdate]) -> Result<Cart>;

    async fn login(&self, credentials: &Credentials) -> Result<AuthSession>;
    async fn register(&self, registration: &Registration) -> Result<AuthSession>;
    async fn logout(&self, session: &Session) -> Result<()>;
    async fn get_current_user(&self, session: &Session) -> Result<Option<User>>;

    async fn create_order(&self, session: &Session, request: &CheckoutRequest) -> Result<Order>;
    async fn get_order(&self, session: &Session, order_id: &str) -> Result<Option<Order>>;
    async fn get_orders(&self, session: &Session) -> Result<Vec<Order>>;

    async fn get_menu(&self, handle: &str) -> Result<Vec<Menu>>;
    async fn get_page(&self, handle: &str) -> Result<Option<Page>>;
    async fn get_pages(&self) -> Result<Vec<Page>>;

    /// Cache invalidation webhook. Providers without one acknowledge and do nothing.
    async fn revalidate(&self, _topic: Option<&str>, _secret: Option<&str>) -> Result<Revalidation> {
        Ok(Revalidation::ignored())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Custom,
    Shopify,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ProviderKind::Local),
            "custom" => Ok(ProviderKind::Custom),
            "shopify" => Ok(ProviderKind::Shopify),
            other => Err(format!("Unknown commerce provider: {other}")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Local => "local",
            ProviderKind::Custom => "custom",
            ProviderKind::Shopify => "shopify",
        })
    }
}

impl ProviderKind {
    /// Unknown names fall back to the local provider.
    pub fn select(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return ProviderKind::Local;
        };

        name.parse().unwrap_or_else(|e| {
            warn!("{e}, falling back to local");
            ProviderKind::Local
        })
    }
}

/// The selected provider together with the features the storefront may use.
#[derive(Clone)]
pub struct Commerce {
    provider: Arc<dyn CommerceProvider>,
    features: CommerceFeatures,
}

impl Commerce {
    pub fn new(provider: Arc<dyn CommerceProvider>, overrides: Option<&FeatureOverrides>) -> Self {
        let declared = provider.features();
        let features = match overrides {
            Some(overrides) => declared.merge(overrides),
            None => declared,
        };

        info!("Commerce provider: {} {:?}", provider.name(), features);

        Self { provider, features }
    }

    pub fn provider(&self) -> &dyn CommerceProvider {
        self.provider.as_ref()
    }

    pub fn features(&self) -> CommerceFeatures {
        self.features
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.features.is_enabled(feature)
    }

    pub fn require(&self, feature: Feature) -> Result<&dyn CommerceProvider> {
        if self.is_enabled(feature) {
            Ok(self.provider())
        } else {
            Err(CommerceError::Unsupported(feature))
        }
    }
}

impl fmt::Debug for Commerce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commerce")
            .field("provider", &self.provider.name())
            .field("features", &self.features)
            .finish()
    }
}
