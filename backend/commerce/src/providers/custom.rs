//! # Custom Provider
//!
//! Talks to the in-house REST backend through [`ApiClient`] and normalises its
//! payloads with the `transform` functions.
//!
//! Reads never fail the storefront: an unreachable or erroring backend is
//! logged and shows up as a missing item or an empty list. Writes (cart,
//! login, checkout) propagate their errors.
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::{
    api::ApiClient,
    error::{CommerceError, Result},
    features::CommerceFeatures,
    provider::CommerceProvider,
    transform::{
        transform_cart, transform_collection, transform_list, transform_order, transform_product,
        transform_user,
    },
    types::{
        AuthSession, Cart, CartLineInput, CartLineUpdate, CheckoutRequest, Collection,
        CollectionQuery, Credentials, Menu, Order, Page, Product, ProductQuery, Registration,
        Session, User,
    },
};

#[derive(Deserialize)]
struct AuthPayload {
    user: Value,
    token: String,
}

impl From<AuthPayload> for AuthSession {
    fn from(payload: AuthPayload) -> Self {
        AuthSession {
            user: transform_user(&payload.user),
            token: payload.token,
        }
    }
}

fn reverse_param(reverse: bool) -> Option<String> {
    reverse.then(|| "true".to_string())
}

/// Logs a failed read and substitutes `fallback`.
fn or_fallback<T>(operation: &str, result: Result<T>, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        error!("Failed to {operation}: {e}");
        fallback
    })
}

pub struct CustomProvider {
    api: ApiClient,
}

impl CustomProvider {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, Option<String>)]) -> Result<Value> {
        self.api.get(endpoint, params, None).await
    }

    fn cart_id(session: &Session) -> Result<&str> {
        session.cart_id.as_deref().ok_or(CommerceError::CartNotFound)
    }
}

#[async_trait]
impl CommerceProvider for CustomProvider {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn features(&self) -> CommerceFeatures {
        CommerceFeatures::full()
    }

    async fn get_product(&self, handle: &str) -> Result<Option<Product>> {
        let product = self
            .fetch(&format!("/products/{handle}"), &[])
            .await
            .map(|value| Some(transform_product(&value)));

        Ok(or_fallback("get product", product, None))
    }

    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let params = [
            ("q", query.query.clone().filter(|q| !q.is_empty())),
            ("sortKey", query.sort_key.clone()),
            ("reverse", reverse_param(query.reverse)),
        ];
        let products = self
            .fetch("/products", &params)
            .await
            .map(|value| transform_list(&value, transform_product));

        Ok(or_fallback("get products", products, Vec::new()))
    }

    async fn get_product_recommendations(&self, product_id: &str) -> Result<Vec<Product>> {
        let products = self
            .fetch(&format!("/products/{product_id}/recommendations"), &[])
            .await
            .map(|value| transform_list(&value, transform_product));

        Ok(or_fallback("get product recommendations", products, Vec::new()))
    }

    async fn get_collection(&self, handle: &str) -> Result<Option<Collection>> {
        let collection = self
            .fetch(&format!("/collections/{handle}"), &[])
            .await
            .map(|value| Some(transform_collection(&value)));

        Ok(or_fallback("get collection", collection, None))
    }

    async fn get_collections(&self) -> Result<Vec<Collection>> {
        let fetched = self
            .fetch("/collections", &[])
            .await
            .map(|value| transform_list(&value, transform_collection));

        let mut collections = vec![Collection::all(Utc::now().to_rfc3339())];
        collections.extend(or_fallback("get collections", fetched, Vec::new()));

        Ok(collections)
    }

    async fn get_collection_products(&self, query: &CollectionQuery) -> Result<Vec<Product>> {
        let params = [
            ("collection", Some(query.collection.clone())),
            ("sortKey", query.sort_key.clone()),
            ("reverse", reverse_param(query.reverse)),
        ];
        let products = self
            .fetch(&format!("/collections/{}/products", query.collection), &params)
            .await
            .map(|value| transform_list(&value, transform_product));

        Ok(or_fallback("get collection products", products, Vec::new()))
    }

    async fn get_cart(&self, session: &Session) -> Result<Option<Cart>> {
        let Some(cart_id) = session.cart_id.as_deref() else {
            return Ok(None);
        };

        let cart = self
            .fetch(&format!("/cart/{cart_id}"), &[])
            .await
            .map(|value| Some(transform_cart(&value)));

        Ok(or_fallback("get cart", cart, None))
    }

    async fn create_cart(&self, _session: &Session) -> Result<Cart> {
        let value: Value = self.api.post("/cart", None, None).await?;
        Ok(transform_cart(&value))
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

        let body = json!({ "lines": lines });
        let value: Value = self
            .api
            .post(&format!("/cart/{cart_id}/items"), Some(&body), None)
            .await?;

        Ok(transform_cart(&value))
    }

    async fn remove_from_cart(&self, session: &Session, line_ids: &[String]) -> Result<Cart> {
        let cart_id = Self::cart_id(session)?;

        let body = json!({ "lineIds": line_ids });
        let value: Value = self
            .api
            .delete(&format!("/cart/{cart_id}/items"), Some(&body), None)
            .await?;

        Ok(transform_cart(&value))
    }

    async fn update_cart(&self, session: &Session, lines: &[CartLineUpdate]) -> Result<Cart> {
        let cart_id = Self::cart_id(session)?;

        let body = json!({ "lines": lines });
        let value: Value = self
            .api
            .patch(&format!("/cart/{cart_id}/items"), Some(&body), None)
            .await?;

        Ok(transform_cart(&value))
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthSession> {
        let body = serde_json::to_value(credentials)?;
        let payload: AuthPayload = self.api.post("/auth/login", Some(&body), None).await?;

        Ok(payload.into())
    }

    async fn register(&self, registration: &Registration) -> Result<AuthSession> {
        let body = serde_json::to_value(registration)?;
        let payload: AuthPayload = self.api.post("/auth/register", Some(&body), None).await?;

        Ok(payload.into())
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        if let Err(e) = self
            .api
            .post::<Value>("/auth/logout", None, session.auth_token.as_deref())
            .await
        {
            warn!("Logout request failed: {e}");
        }

        Ok(())
    }

    async fn get_current_user(&self, session: &Session) -> Result<Option<User>> {
        let Some(token) = session.auth_token.as_deref() else {
            return Ok(None);
        };

        Ok(self
            .api
            .get::<Value>("/auth/me", &[], Some(token))
            .await
            .ok()
            .map(|value| transform_user(&value)))
    }

    async fn create_order(&self, session: &Session, request: &CheckoutRequest) -> Result<Order> {
        let body = serde_json::to_value(request)?;
        let value: Value = self
            .api
            .post("/orders", Some(&body), session.auth_token.as_deref())
            .await?;

        Ok(transform_order(&value))
    }

    async fn get_order(&self, session: &Session, order_id: &str) -> Result<Option<Order>> {
        let order = self
            .api
            .get::<Value>(
                &format!("/orders/{order_id}"),
                &[],
                session.auth_token.as_deref(),
            )
            .await
            .map(|value| Some(transform_order(&value)));

        Ok(or_fallback("get order", order, None))
    }

    async fn get_orders(&self, session: &Session) -> Result<Vec<Order>> {
        let orders = self
            .api
            .get::<Value>("/orders", &[], session.auth_token.as_deref())
            .await
            .map(|value| transform_list(&value, transform_order));

        Ok(or_fallback("get orders", orders, Vec::new()))
    }

    async fn get_menu(&self, handle: &str) -> Result<Vec<Menu>> {
        let menu = self.api.get(&format!("/menus/{handle}"), &[], None).await;
        Ok(or_fallback("get menu", menu, Vec::new()))
    }

    async fn get_page(&self, handle: &str) -> Result<Option<Page>> {
        let page = self.api.get(&format!("/pages/{handle}"), &[], None).await;
        Ok(or_fallback("get page", page.map(Some), None))
    }

    async fn get_pages(&self) -> Result<Vec<Page>> {
        let pages = self.api.get("/pages", &[], None).await;
        Ok(or_fallback("get pages", pages, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    use super::*;

    fn cart_json(id: &str, lines: Value) -> Value {
        json!({
            "id": id,
            "checkoutUrl": format!("/checkout/{id}"),
            "subtotal": "10.00",
            "total": "10.00",
            "tax": "0",
            "items": lines,
        })
    }

    async fn upstream() -> SocketAddr {
        let app = Router::new()
            .route(
                "/api/products",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let name = params.get("q").cloned().unwrap_or_else(|| "all".to_string());
                    let reverse = params.get("reverse").cloned().unwrap_or_default();
                    Json(json!({"data": [{"_id": "p1", "slug": name, "name": reverse, "price": 12}]}))
                }),
            )
            .route(
                "/api/products/{handle}",
                get(|Path(handle): Path<String>| async move {
                    if handle == "missing" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    Ok(Json(json!({"id": "p1", "handle": handle, "title": "Bear"})))
                }),
            )
            .route(
                "/api/collections",
                get(|| async { Json(json!([{"slug": "bears", "name": "Bears"}])) }),
            )
            .route(
                "/api/cart",
                post(|| async { Json(cart_json("new-cart", json!([]))) }),
            )
            .route(
                "/api/cart/{id}/items",
                post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                    let line = &body["lines"][0];
                    Json(cart_json(
                        &id,
                        json!([{
                            "id": "line-1",
                            "variantId": line["merchandiseId"],
                            "quantity": line["quantity"],
                            "total": "10.00",
                        }]),
                    ))
                }),
            )
            .route(
                "/api/auth/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] != "secret" {
                        return Err((
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"message": "Invalid credentials"})),
                        ));
                    }
                    Ok(Json(json!({
                        "user": {"_id": "u1", "email": body["email"], "first_name": "Ada"},
                        "token": "tok-1",
                    })))
                }),
            )
            .route(
                "/api/auth/me",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer tok-1") => Ok(Json(json!({"id": "u1", "email": "a@b.c"}))),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            )
            .route(
                "/api/auth/logout",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/api/menus/{handle}",
                get(|| async { Json(json!([{"title": "Home", "path": "/"}])) }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        address
    }

    async fn provider() -> CustomProvider {
        CustomProvider::new(ApiClient::new(format!("http://{}/api", upstream().await)))
    }

    #[tokio::test]
    async fn test_get_product_and_missing() {
        let provider = provider().await;

        let product = provider.get_product("bear").await.unwrap().unwrap();
        assert_eq!(product.handle, "bear");
        assert_eq!(product.title, "Bear");

        assert_eq!(provider.get_product("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_products_passes_query() {
        let provider = provider().await;

        let products = provider
            .get_products(&ProductQuery {
                query: Some("teddy".to_string()),
                sort_key: None,
                reverse: true,
            })
            .await
            .unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].handle, "teddy");
        assert_eq!(products[0].title, "true");
        assert_eq!(products[0].price_range.min_variant_price.amount, "12");
    }

    #[tokio::test]
    async fn test_collections_start_with_all() {
        let provider = provider().await;

        let collections = provider.get_collections().await.unwrap();
        assert_eq!(collections.len(), 2);
        assert_eq!(collections[0].handle, "");
        assert_eq!(collections[0].path, "/search");
        assert_eq!(collections[1].path, "/search/bears");
    }

    #[tokio::test]
    async fn test_unreachable_backend_reads_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let provider = CustomProvider::new(ApiClient::new(format!("http://{address}/api")));

        assert!(provider.get_products(&ProductQuery::default()).await.unwrap().is_empty());
        assert_eq!(provider.get_collections().await.unwrap().len(), 1);
        assert!(provider.get_menu("main").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_to_cart_creates_cart() {
        let provider = provider().await;

        let cart = provider
            .add_to_cart(
                &Session::default(),
                &[CartLineInput {
                    merchandise_id: "variant-1".to_string(),
                    quantity: 2,
                }],
            )
            .await
            .unwrap();

        assert_eq!(cart.id.as_deref(), Some("new-cart"));
        assert_eq!(cart.total_quantity, 2);
        assert_eq!(cart.lines[0].merchandise.id, "variant-1");
    }

    #[tokio::test]
    async fn test_update_without_cart() {
        let provider = provider().await;

        let err = provider
            .remove_from_cart(&Session::default(), &["line-1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::CartNotFound));
    }

    #[tokio::test]
    async fn test_login_and_current_user() {
        let provider = provider().await;

        let session = provider
            .login(&Credentials {
                email: "a@b.c".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.user.first_name.as_deref(), Some("Ada"));

        let err = provider
            .login(&Credentials {
                email: "a@b.c".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));

        let me = provider
            .get_current_user(&Session::default().with_token("tok-1"))
            .await
            .unwrap();
        assert_eq!(me.unwrap().email, "a@b.c");

        let nobody = provider
            .get_current_user(&Session::default().with_token("stale"))
            .await
            .unwrap();
        assert_eq!(nobody, None);
    }

    #[tokio::test]
    async fn test_logout_ignores_upstream_failure() {
        let provider = provider().await;

        provider
            .logout(&Session::default().with_token("tok-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_menu_passthrough() {
        let provider = provider().await;

        assert_eq!(
            provider.get_menu("main").await.unwrap(),
            vec![Menu::new("Home", "/")]
        );
    }
}
