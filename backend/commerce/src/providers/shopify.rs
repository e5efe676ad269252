//! # Shopify Provider
//!
//! Reads the catalog and manages carts through the Shopify Storefront GraphQL
//! API. Customer accounts and orders are left to Shopify's hosted checkout,
//! reached through the cart's `checkoutUrl`.
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, CommerceError, Result},
    features::{CommerceFeatures, Feature},
    provider::{CommerceProvider, Revalidation},
    sorting::{HIDDEN_PRODUCT_TAG, SORT_CREATED_AT},
    transform::{transform_cart, transform_collection, transform_product},
    types::{
        AuthSession, Cart, CartLineInput, CartLineUpdate, CheckoutRequest, Collection,
        CollectionQuery, Credentials, Menu, Order, Page, Product, ProductQuery, Registration, Seo,
        Session, User,
    },
};

pub const API_VERSION: &str = "2023-01";
pub const STORE_DOMAIN_VAR: &str = "SHOPIFY_STORE_DOMAIN";
pub const ACCESS_TOKEN_VAR: &str = "SHOPIFY_STOREFRONT_ACCESS_TOKEN";
pub const REVALIDATION_SECRET_VAR: &str = "SHOPIFY_REVALIDATION_SECRET";

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Storefront-Access-Token";
const HIDDEN_COLLECTION_PREFIX: &str = "hidden";
const PAGE_SIZE: u32 = 100;

const COLLECTION_WEBHOOKS: [&str; 3] = [
    "collections/create",
    "collections/delete",
    "collections/update",
];
const PRODUCT_WEBHOOKS: [&str; 3] = ["products/create", "products/delete", "products/update"];

const IMAGE_FRAGMENT: &str = "
fragment image on Image {
  url
  altText
  width
  height
}";

const SEO_FRAGMENT: &str = "
fragment seo on SEO {
  description
  title
}";

const PRODUCT_FRAGMENT: &str = "
fragment product on Product {
  id
  handle
  availableForSale
  title
  description
  descriptionHtml
  options { id name values }
  priceRange {
    maxVariantPrice { amount currencyCode }
    minVariantPrice { amount currencyCode }
  }
  variants(first: 250) {
    edges {
      node {
        id
        title
        availableForSale
        selectedOptions { name value }
        price { amount currencyCode }
      }
    }
  }
  featuredImage { ...image }
  images(first: 20) { edges { node { ...image } } }
  seo { ...seo }
  tags
  updatedAt
}";

const CART_FRAGMENT: &str = "
fragment cart on Cart {
  id
  checkoutUrl
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
    totalTaxAmount { amount currencyCode }
  }
  lines(first: 100) {
    edges {
      node {
        id
        quantity
        cost { totalAmount { amount currencyCode } }
        merchandise {
          ... on ProductVariant {
            id
            title
            selectedOptions { name value }
            product { id handle title featuredImage { ...image } }
          }
        }
      }
    }
  }
  totalQuantity
}";

const PAGE_FIELDS: &str = "id title handle body bodySummary seo { ...seo } createdAt updatedAt";

/// Connection details, read from the environment or `provider.config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopifySettings {
    pub endpoint: String,
    pub access_token: String,
    pub revalidation_secret: Option<String>,
}

impl ShopifySettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let domain = lookup(STORE_DOMAIN_VAR)
            .filter(|domain| !domain.trim().is_empty())
            .ok_or_else(|| CommerceError::Misconfigured(format!("{STORE_DOMAIN_VAR} is not set")))?;
        let access_token = lookup(ACCESS_TOKEN_VAR)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| CommerceError::Misconfigured(format!("{ACCESS_TOKEN_VAR} is not set")))?;

        if domain.contains('[') || domain.contains(']') {
            return Err(CommerceError::Misconfigured(format!(
                "{STORE_DOMAIN_VAR} must be a plain domain, got {domain}"
            )));
        }

        Ok(Self {
            endpoint: graphql_endpoint(&domain),
            access_token,
            revalidation_secret: lookup(REVALIDATION_SECRET_VAR),
        })
    }
}

pub fn graphql_endpoint(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    let base = if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    };

    format!("{base}/api/{API_VERSION}/graphql.json")
}

/// Flattens a GraphQL connection (`{ edges: [{ node }] }`) into its nodes.
fn nodes(connection: &Value) -> Vec<Value> {
    connection
        .get("edges")
        .and_then(Value::as_array)
        .map(|edges| {
            edges
                .iter()
                .filter_map(|edge| edge.get("node").cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn reshape_product(value: &Value) -> Product {
    let mut flat = value.clone();
    for connection in ["variants", "images"] {
        if let Some(field) = flat.get_mut(connection) {
            *field = Value::Array(nodes(field));
        }
    }

    transform_product(&flat)
}

fn reshape_products(connection: &Value) -> Vec<Product> {
    nodes(connection)
        .iter()
        .map(reshape_product)
        .filter(|product| !product.tags.iter().any(|tag| tag == HIDDEN_PRODUCT_TAG))
        .collect()
}

fn reshape_cart(value: &Value) -> Cart {
    let mut flat = value.clone();
    if let Some(lines) = flat.get_mut("lines") {
        *lines = Value::Array(nodes(lines));
    }

    transform_cart(&flat)
}

fn reshape_page(value: &Value) -> Page {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let seo = value.get("seo").filter(|seo| !seo.is_null()).map(|seo| Seo {
        title: seo
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: seo
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    });

    Page {
        id: text("id"),
        title: text("title"),
        handle: text("handle"),
        body: text("body"),
        body_summary: text("bodySummary"),
        seo,
        created_at: text("createdAt"),
        updated_at: text("updatedAt"),
    }
}

/// Collection product queries name the creation date sort key differently.
fn collection_sort_key(sort_key: Option<&str>) -> Option<&str> {
    sort_key.map(|key| if key == SORT_CREATED_AT { "CREATED" } else { key })
}

pub struct ShopifyProvider {
    settings: ShopifySettings,
    store_origin: String,
    http: Client,
}

impl ShopifyProvider {
    pub fn new(settings: ShopifySettings) -> Self {
        let store_origin = settings
            .endpoint
            .split("/api/")
            .next()
            .unwrap_or_default()
            .to_string();

        info!("Shopify endpoint: {}", settings.endpoint);

        Self {
            settings,
            store_origin,
            http: Client::new(),
        }
    }

    async fn query(&self, query: String, variables: Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.settings.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.settings.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let mut body: Value = response.json().await?;

        let first_error = body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if !status.is_success() || first_error.is_some() {
            return Err(ApiError {
                status: status.as_u16(),
                message: first_error.unwrap_or_else(|| {
                    format!("Shopify error: {}", status.canonical_reason().unwrap_or("Unknown"))
                }),
                errors: None,
            }
            .into());
        }

        Ok(body.get_mut("data").map(Value::take).unwrap_or_default())
    }

    /// Rewrites Shopify storefront URLs into site-relative paths.
    fn menu_path(&self, url: &str) -> String {
        let host = self
            .store_origin
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        url.replace(&self.store_origin, "")
            .replace(&format!("https://{host}"), "")
            .replace("/collections", "/search")
            .replace("/pages", "")
    }

    fn cart_id(session: &Session) -> Result<&str> {
        session.cart_id.as_deref().ok_or(CommerceError::CartNotFound)
    }

    async fn cart_mutation(&self, mutation: &str, field: &str, variables: Value) -> Result<Cart> {
        let query = format!("{mutation}{CART_FRAGMENT}{IMAGE_FRAGMENT}");
        let data = self.query(query, variables).await?;

        Ok(reshape_cart(&data[field]["cart"]))
    }
}

#[async_trait]
impl CommerceProvider for ShopifyProvider {
    fn name(&self) -> &'static str {
        "shopify"
    }

    fn features(&self) -> CommerceFeatures {
        CommerceFeatures {
            cart: true,
            search: true,
            product_recommendations: true,
            collections: true,
            menus: true,
            pages: true,
            ..CommerceFeatures::none()
        }
    }

    async fn get_product(&self, handle: &str) -> Result<Option<Product>> {
        let query = format!(
            "query getProduct($handle: String!) {{ product(handle: $handle) {{ ...product }} }}\
             {PRODUCT_FRAGMENT}{IMAGE_FRAGMENT}{SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({ "handle": handle })).await?;

        Ok(data
            .get("product")
            .filter(|product| !product.is_null())
            .map(reshape_product))
    }

    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let graphql = format!(
            "query getProducts($sortKey: ProductSortKeys, $reverse: Boolean, $query: String) {{ \
             products(sortKey: $sortKey, reverse: $reverse, query: $query, first: {PAGE_SIZE}) {{ \
             edges {{ node {{ ...product }} }} }} }}\
             {PRODUCT_FRAGMENT}{IMAGE_FRAGMENT}{SEO_FRAGMENT}"
        );
        let data = self
            .query(
                graphql,
                json!({
                    "query": query.query,
                    "sortKey": query.sort_key,
                    "reverse": query.reverse,
                }),
            )
            .await?;

        Ok(reshape_products(&data["products"]))
    }

    async fn get_product_recommendations(&self, product_id: &str) -> Result<Vec<Product>> {
        let query = format!(
            "query getProductRecommendations($productId: ID!) {{ \
             productRecommendations(productId: $productId) {{ ...product }} }}\
             {PRODUCT_FRAGMENT}{IMAGE_FRAGMENT}{SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({ "productId": product_id })).await?;

        Ok(data["productRecommendations"]
            .as_array()
            .map(|products| {
                products
                    .iter()
                    .map(reshape_product)
                    .filter(|product| !product.tags.iter().any(|tag| tag == HIDDEN_PRODUCT_TAG))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_collection(&self, handle: &str) -> Result<Option<Collection>> {
        let query = format!(
            "query getCollection($handle: String!) {{ collection(handle: $handle) {{ \
             handle title description seo {{ ...seo }} updatedAt }} }}{SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({ "handle": handle })).await?;

        Ok(data
            .get("collection")
            .filter(|collection| !collection.is_null())
            .map(transform_collection))
    }

    async fn get_collections(&self) -> Result<Vec<Collection>> {
        let query = format!(
            "query getCollections {{ collections(first: {PAGE_SIZE}, sortKey: TITLE) {{ \
             edges {{ node {{ handle title description seo {{ ...seo }} updatedAt }} }} }} }}\
             {SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({})).await?;

        let mut collections = vec![Collection::all(Utc::now().to_rfc3339())];
        collections.extend(
            nodes(&data["collections"])
                .iter()
                .map(transform_collection)
                .filter(|collection| !collection.handle.starts_with(HIDDEN_COLLECTION_PREFIX)),
        );

        Ok(collections)
    }

    async fn get_collection_products(&self, query: &CollectionQuery) -> Result<Vec<Product>> {
        let graphql = format!(
            "query getCollectionProducts($handle: String!, $sortKey: ProductCollectionSortKeys, \
             $reverse: Boolean) {{ collection(handle: $handle) {{ \
             products(sortKey: $sortKey, reverse: $reverse, first: {PAGE_SIZE}) {{ \
             edges {{ node {{ ...product }} }} }} }} }}\
             {PRODUCT_FRAGMENT}{IMAGE_FRAGMENT}{SEO_FRAGMENT}"
        );
        let data = self
            .query(
                graphql,
                json!({
                    "handle": query.collection,
                    "sortKey": collection_sort_key(query.sort_key.as_deref()),
                    "reverse": query.reverse,
                }),
            )
            .await?;

        if data["collection"].is_null() {
            debug!("No collection found for `{}`", query.collection);
            return Ok(Vec::new());
        }

        Ok(reshape_products(&data["collection"]["products"]))
    }

    async fn get_cart(&self, session: &Session) -> Result<Option<Cart>> {
        let Some(cart_id) = session.cart_id.as_deref() else {
            return Ok(None);
        };

        let query = format!(
            "query getCart($cartId: ID!) {{ cart(id: $cartId) {{ ...cart }} }}\
             {CART_FRAGMENT}{IMAGE_FRAGMENT}"
        );
        let data = self.query(query, json!({ "cartId": cart_id })).await?;

        // Old carts disappear after checkout.
        Ok(data
            .get("cart")
            .filter(|cart| !cart.is_null())
            .map(reshape_cart))
    }

    async fn create_cart(&self, _session: &Session) -> Result<Cart> {
        self.cart_mutation(
            "mutation createCart($lineItems: [CartLineInput!]) { \
             cartCreate(input: { lines: $lineItems }) { cart { ...cart } } }",
            "cartCreate",
            json!({}),
        )
        .await
    }

    async fn add_to_cart(&self, session: &Session, lines: &[CartLineInput]) -> Result<Cart> {
        let cart_id = match session.cart_id.clone() {
            Some(cart_id) => cart_id,
            None => self
                .create_cart(session)
                .await?
                .id
                .ok_or_else(|| CommerceError::NotFound("cart id in created cart".to_string()))?,
        };

        self.cart_mutation(
            "mutation addToCart($cartId: ID!, $lines: [CartLineInput!]!) { \
             cartLinesAdd(cartId: $cartId, lines: $lines) { cart { ...cart } } }",
            "cartLinesAdd",
            json!({ "cartId": cart_id, "lines": lines }),
        )
        .await
    }

    async fn remove_from_cart(&self, session: &Session, line_ids: &[String]) -> Result<Cart> {
        let cart_id = Self::cart_id(session)?;

        self.cart_mutation(
            "mutation removeFromCart($cartId: ID!, $lineIds: [ID!]!) { \
             cartLinesRemove(cartId: $cartId, lineIds: $lineIds) { cart { ...cart } } }",
            "cartLinesRemove",
            json!({ "cartId": cart_id, "lineIds": line_ids }),
        )
        .await
    }

    async fn update_cart(&self, session: &Session, lines: &[CartLineUpdate]) -> Result<Cart> {
        let cart_id = Self::cart_id(session)?;

        self.cart_mutation(
            "mutation editCartItems($cartId: ID!, $lines: [CartLineUpdateInput!]!) { \
             cartLinesUpdate(cartId: $cartId, lines: $lines) { cart { ...cart } } }",
            "cartLinesUpdate",
            json!({ "cartId": cart_id, "lines": lines }),
        )
        .await
    }

    async fn login(&self, _credentials: &Credentials) -> Result<AuthSession> {
        Err(CommerceError::Unsupported(Feature::CustomerAuth))
    }

    async fn register(&self, _registration: &Registration) -> Result<AuthSession> {
        Err(CommerceError::Unsupported(Feature::CustomerAuth))
    }

    async fn logout(&self, _session: &Session) -> Result<()> {
        Err(CommerceError::Unsupported(Feature::CustomerAuth))
    }

    async fn get_current_user(&self, _session: &Session) -> Result<Option<User>> {
        Ok(None)
    }

    async fn create_order(&self, _session: &Session, _request: &CheckoutRequest) -> Result<Order> {
        Err(CommerceError::Unsupported(Feature::Orders))
    }

    async fn get_order(&self, _session: &Session, _order_id: &str) -> Result<Option<Order>> {
        Err(CommerceError::Unsupported(Feature::Orders))
    }

    async fn get_orders(&self, _session: &Session) -> Result<Vec<Order>> {
        Err(CommerceError::Unsupported(Feature::Orders))
    }

    async fn get_menu(&self, handle: &str) -> Result<Vec<Menu>> {
        let query = "query getMenu($handle: String!) { menu(handle: $handle) { items { title url } } }";
        let data = self
            .query(query.to_string(), json!({ "handle": handle }))
            .await?;

        Ok(data["menu"]["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| Menu {
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        path: self.menu_path(item["url"].as_str().unwrap_or_default()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_page(&self, handle: &str) -> Result<Option<Page>> {
        let query = format!(
            "query getPage($handle: String!) {{ pageByHandle(handle: $handle) {{ {PAGE_FIELDS} }} }}\
             {SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({ "handle": handle })).await?;

        Ok(data
            .get("pageByHandle")
            .filter(|page| !page.is_null())
            .map(reshape_page))
    }

    async fn get_pages(&self) -> Result<Vec<Page>> {
        let query = format!(
            "query getPages {{ pages(first: {PAGE_SIZE}) {{ edges {{ node {{ {PAGE_FIELDS} }} }} }} }}\
             {SEO_FRAGMENT}"
        );
        let data = self.query(query, json!({})).await?;

        Ok(nodes(&data["pages"]).iter().map(reshape_page).collect())
    }

    async fn revalidate(&self, topic: Option<&str>, secret: Option<&str>) -> Result<Revalidation> {
        let expected = self.settings.revalidation_secret.as_deref();
        if secret.is_none() || secret != expected {
            warn!("Rejected revalidation with an invalid secret");
            return Ok(Revalidation {
                status: 401,
                revalidated: false,
            });
        }

        let Some(topic) = topic else {
            return Ok(Revalidation::ignored());
        };

        if COLLECTION_WEBHOOKS.contains(&topic) || PRODUCT_WEBHOOKS.contains(&topic) {
            info!("Revalidating after {topic}");
            Ok(Revalidation {
                status: 200,
                revalidated: true,
            })
        } else {
            Ok(Revalidation::ignored())
        }
    }
}
