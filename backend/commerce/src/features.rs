//! # Feature Flags
//!
//! Every provider declares which parts of the storefront it can back. The
//! declaration can be narrowed or widened by `commerce.config.json`, whose
//! values always win over the provider's.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Cart,
    CustomerAuth,
    Wishlist,
    Orders,
    Search,
    ProductRecommendations,
    Collections,
    Menus,
    Pages,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Cart => "cart",
            Feature::CustomerAuth => "customerAuth",
            Feature::Wishlist => "wishlist",
            Feature::Orders => "orders",
            Feature::Search => "search",
            Feature::ProductRecommendations => "productRecommendations",
            Feature::Collections => "collections",
            Feature::Menus => "menus",
            Feature::Pages => "pages",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommerceFeatures {
    pub cart: bool,
    pub customer_auth: bool,
    pub wishlist: bool,
    pub orders: bool,
    pub search: bool,
    pub product_recommendations: bool,
    pub collections: bool,
    pub menus: bool,
    pub pages: bool,
}

impl CommerceFeatures {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            cart: true,
            customer_auth: true,
            wishlist: true,
            orders: true,
            search: true,
            product_recommendations: true,
            collections: true,
            menus: true,
            pages: true,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Cart => self.cart,
            Feature::CustomerAuth => self.customer_auth,
            Feature::Wishlist => self.wishlist,
            Feature::Orders => self.orders,
            Feature::Search => self.search,
            Feature::ProductRecommendations => self.product_recommendations,
            Feature::Collections => self.collections,
            Feature::Menus => self.menus,
            Feature::Pages => self.pages,
        }
    }

    pub fn merge(self, overrides: &FeatureOverrides) -> Self {
        Self {
            cart: overrides.cart.unwrap_or(self.cart),
            customer_auth: overrides.customer_auth.unwrap_or(self.customer_auth),
            wishlist: overrides.wishlist.unwrap_or(self.wishlist),
            orders: overrides.orders.unwrap_or(self.orders),
            search: overrides.search.unwrap_or(self.search),
            product_recommendations: overrides
                .product_recommendations
                .unwrap_or(self.product_recommendations),
            collections: overrides.collections.unwrap_or(self.collections),
            menus: overrides.menus.unwrap_or(self.menus),
            pages: overrides.pages.unwrap_or(self.pages),
        }
    }
}

/// Partial feature set as written in `commerce.config.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureOverrides {
    pub cart: Option<bool>,
    pub customer_auth: Option<bool>,
    pub wishlist: Option<bool>,
    pub orders: Option<bool>,
    pub search: Option<bool>,
    pub product_recommendations: Option<bool>,
    pub collections: Option<bool>,
    pub menus: Option<bool>,
    pub pages: Option<bool>,
}

impl FeatureOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
