//! # Admin Proxy
//!
//! The back office never talks to the backend itself: every admin route here
//! forwards to the customer backend with the `admin_token` cookie as bearer.
//!
//! ## Offline development
//! With `APP_ENV=development` and the backend down, `admin@example.com` /
//! `admin123` still signs in and `/me` answers with a synthesized admin.
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Query, RawQuery, Request, State as AxumState},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use commerce::api::{RawResponse, unwrap_envelope};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{
    auth::upstream_error,
    error::AppError,
    state::State,
    utils::{ADMIN_COOKIE, cookie_value, now_millis, removal, session_cookie},
};

const DEV_ADMIN_EMAIL: &str = "admin@example.com";
const DEV_ADMIN_PASSWORD: &str = "admin123";

/// Token of the signed-in admin, put in place by [`require_admin`].
#[derive(Debug, Clone)]
pub struct AdminToken(pub String);

#[derive(Deserialize)]
pub struct AdminLogin {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct OrderListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

fn dev_admin() -> Value {
    json!({
        "id": "1",
        "email": DEV_ADMIN_EMAIL,
        "name": "Administrator",
        "role": "admin",
    })
}

fn empty_stats() -> Value {
    json!({
        "totalProducts": 0,
        "totalOrders": 0,
        "totalRevenue": 0,
        "totalUsers": 0,
        "recentOrders": [],
        "popularProducts": [],
    })
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get(name)
        .or_else(|| body.get("data").and_then(|data| data.get(name)))
        .filter(|value| !value.is_null())
}

/// Turns an upstream answer into a response with the same status and body.
fn relay(raw: RawResponse) -> Response {
    let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::BAD_GATEWAY);

    match raw.body {
        Some(body) if status != StatusCode::NO_CONTENT => (status, Json(body)).into_response(),
        _ => status.into_response(),
    }
}

pub async fn require_admin(jar: CookieJar, mut request: Request, next: Next) -> Response {
    match cookie_value(&jar, ADMIN_COOKIE) {
        Some(token) => {
            request.extensions_mut().insert(AdminToken(token));
            next.run(request).await
        }
        None => AppError::Unauthorized("Not logged in".to_string()).into_response(),
    }
}

pub async fn login(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(credentials): Json<AdminLogin>,
) -> Result<Response, AppError> {
    let body = json!({ "email": credentials.email, "password": credentials.password });
    let secure = state.config.secure_cookies();

    let raw = match state
        .admin_backend
        .forward(Method::POST, "/auth/login", None, Some(&body), None)
        .await
    {
        Ok(raw) => raw,
        Err(e) if e.is_unreachable() => {
            warn!("Admin backend unreachable: {e}");

            let offline_ok = state.config.is_development()
                && credentials.email == DEV_ADMIN_EMAIL
                && credentials.password == DEV_ADMIN_PASSWORD;
            if !offline_ok {
                return Err(AppError::Unavailable(
                    "Backend service unavailable, check the configuration".to_string(),
                ));
            }

            let jar = jar.add(session_cookie(
                ADMIN_COOKIE,
                format!("admin_token_{}", now_millis()),
                secure,
            ));
            return Ok((
                jar,
                Json(json!({
                    "success": true,
                    "message": "Login successful (development mode)",
                    "user": dev_admin(),
                })),
            )
                .into_response());
        }
        Err(e) => return Err(upstream_error(e, "Login failed, please try again later")),
    };

    let body = raw.body.unwrap_or_default();
    if !(200..300).contains(&raw.status) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Invalid email or password");
        return Err(AppError::Upstream {
            status: raw.status,
            message: message.to_string(),
        });
    }

    let mut jar = jar;
    if let Some(token) = field(&body, "token").and_then(Value::as_str) {
        jar = jar.add(session_cookie(ADMIN_COOKIE, token, secure));
    }

    let user = field(&body, "user").cloned().unwrap_or_else(|| {
        let flat = unwrap_envelope(body.clone());
        json!({
            "id": flat.get("id"),
            "email": flat.get("email"),
            "name": flat.get("name"),
            "role": flat.get("role").and_then(Value::as_str).unwrap_or("admin"),
        })
    });

    info!("Admin {} logged in", credentials.email);

    Ok((
        jar,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "user": user,
        })),
    )
        .into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(removal(ADMIN_COOKIE)),
        Json(json!({ "success": true })),
    )
}

pub async fn me(
    AxumState(state): AxumState<Arc<State>>,
    Extension(AdminToken(token)): Extension<AdminToken>,
) -> Result<Json<Value>, AppError> {
    match state
        .backend
        .get::<Value>("/auth/me", &[], Some(&token))
        .await
    {
        Ok(user) => Ok(Json(json!({ "user": user }))),
        Err(e) if e.is_unreachable() && state.config.is_development() => {
            warn!("Admin profile unavailable, using development admin: {e}");
            Ok(Json(json!({ "user": dev_admin() })))
        }
        Err(e) => Err(upstream_error(e, "Backend service unavailable")),
    }
}

pub async fn stats(
    AxumState(state): AxumState<Arc<State>>,
    Extension(AdminToken(token)): Extension<AdminToken>,
) -> Json<Value> {
    match state
        .backend
        .get::<Value>("/stats", &[], Some(&token))
        .await
    {
        Ok(stats) => Json(stats),
        Err(e) => {
            warn!("Failed to load stats: {e}");
            Json(empty_stats())
        }
    }
}

pub async fn orders(
    AxumState(state): AxumState<Arc<State>>,
    Extension(AdminToken(token)): Extension<AdminToken>,
    Query(params): Query<OrderListParams>,
) -> Response {
    let query = [
        ("page", params.page.unwrap_or(1).to_string()),
        ("limit", params.limit.unwrap_or(20).to_string()),
        ("status", params.status.unwrap_or_default()),
    ];

    let failure = |status: StatusCode, message: String| {
        (
            status,
            Json(json!({ "error": message, "data": [], "total": 0 })),
        )
            .into_response()
    };

    match state
        .backend
        .forward_with(Method::GET, "/orders", &query, None, Some(&token))
        .await
    {
        Ok(raw) if (200..300).contains(&raw.status) => relay(raw),
        Ok(raw) => {
            let message = raw
                .body
                .as_ref()
                .and_then(|body| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Failed to load orders")
                .to_string();
            failure(
                StatusCode::from_u16(raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message,
            )
        }
        Err(e) => {
            error!("Failed to load orders: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load orders".to_string())
        }
    }
}

async fn proxy(
    state: &State,
    method: Method,
    endpoint: String,
    query: Option<String>,
    token: &str,
    body: Option<Value>,
) -> Response {
    match state
        .backend
        .forward(method.clone(), &endpoint, query.as_deref(), body.as_ref(), Some(token))
        .await
    {
        Ok(raw) => relay(raw),
        Err(e) => {
            error!("Admin proxy {method} {endpoint} failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Request to {endpoint} failed") })),
            )
                .into_response()
        }
    }
}

/// Reads an optional JSON body; an empty one forwards nothing.
fn json_body(bytes: &[u8]) -> Result<Option<Value>, AppError> {
    if bytes.is_empty() {
        return Ok(None);
    }

    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Forwards `/api/admin/<resource>[/<id>]` to `<backend>/<resource>[/<id>]`.
pub async fn passthrough(
    AxumState(state): AxumState<Arc<State>>,
    Extension(AdminToken(token)): Extension<AdminToken>,
    method: Method,
    RawQuery(query): RawQuery,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let endpoint = request
        .uri()
        .path()
        .strip_prefix("/api/admin")
        .unwrap_or(request.uri().path())
        .to_string();

    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable body: {e}")))?;

    Ok(proxy(&state, method, endpoint, query, &token, json_body(&bytes)?).await)
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::to_bytes,
        http::{HeaderMap, header},
        routing::{get, post},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::routes::{
        router,
        testing::{spawn_upstream, state_with_backends, unreachable_url},
    };

    async fn call(
        state: Arc<State>,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut request = axum::http::Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router(state)
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|value| value.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, set_cookie, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn admin_backend() -> String {
        let app = Router::new().route(
            "/auth/login",
            post(|Json(body): Json<Value>| async move {
                if body["password"] == "right" {
                    (
                        StatusCode::OK,
                        Json(json!({"data": {"token": "adm-1", "user": {"id": "9", "role": "owner"}}})),
                    )
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})))
                }
            }),
        );

        spawn_upstream(app).await
    }

    async fn backend() -> String {
        let app = Router::new()
            .route(
                "/products",
                get(|headers: HeaderMap, RawQuery(query): RawQuery| async move {
                    Json(json!({"auth": bearer(&headers), "query": query}))
                })
                .post(|Json(body): Json<Value>| async move {
                    (StatusCode::CREATED, Json(json!({"created": body["title"]})))
                }),
            )
            .route(
                "/products/{id}",
                axum::routing::delete(|| async { StatusCode::NO_CONTENT }),
            )
            .route(
                "/orders",
                get(|RawQuery(query): RawQuery| async move {
                    Json(json!({"data": [], "total": 0, "query": query}))
                }),
            )
            .route(
                "/stats",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );

        spawn_upstream(app).await
    }

    #[tokio::test]
    async fn test_guard() {
        let state = state_with_backends(&unreachable_url().await, &unreachable_url().await, false);

        let (status, _, body) = call(state.clone(), "GET", "/api/admin/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not logged in");

        let (status, cookie, _) =
            call(state, "POST", "/api/admin/logout", Some("admin_token=x"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().starts_with("admin_token=;"));
    }

    #[tokio::test]
    async fn test_login_against_backend() {
        let state = state_with_backends(&unreachable_url().await, &admin_backend().await, false);

        let (status, cookie, body) = call(
            state.clone(),
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": "boss@example.com", "password": "right"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().starts_with("admin_token=adm-1"));
        assert_eq!(body["user"]["role"], "owner");
        assert_eq!(body["message"], "Login successful");

        let (status, _, body) = call(
            state,
            "POST",
            "/api/admin/login",
            None,
            Some(json!({"email": "boss@example.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Bad credentials");
    }

    #[tokio::test]
    async fn test_login_offline() {
        let offline = unreachable_url().await;
        let dev = json!({"email": DEV_ADMIN_EMAIL, "password": DEV_ADMIN_PASSWORD});

        let (status, cookie, body) = call(
            state_with_backends(&offline, &offline, true),
            "POST",
            "/api/admin/login",
            None,
            Some(dev.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().starts_with("admin_token=admin_token_"));
        assert_eq!(body["user"]["name"], "Administrator");

        let (status, _, _) = call(
            state_with_backends(&offline, &offline, false),
            "POST",
            "/api/admin/login",
            None,
            Some(dev),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_me_and_stats_fallbacks() {
        let offline = unreachable_url().await;

        let (status, _, body) = call(
            state_with_backends(&offline, &offline, true),
            "GET",
            "/api/admin/me",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "admin");

        let (status, _, _) = call(
            state_with_backends(&offline, &offline, false),
            "GET",
            "/api/admin/me",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let state = state_with_backends(&backend().await, &offline, false);
        let (status, _, body) =
            call(state, "GET", "/api/admin/stats", Some("admin_token=t"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, empty_stats());
    }

    #[tokio::test]
    async fn test_order_list_defaults() {
        let state = state_with_backends(&backend().await, &unreachable_url().await, false);

        let (status, _, body) =
            call(state, "GET", "/api/admin/orders", Some("admin_token=t"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "page=1&limit=20&status=");
        assert_eq!(body["total"], 0);

        let offline = unreachable_url().await;
        let (status, _, body) = call(
            state_with_backends(&offline, &offline, false),
            "GET",
            "/api/admin/orders?page=2",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_order_filter_cannot_inject_params() {
        let state = state_with_backends(&backend().await, &unreachable_url().await, false);

        let (status, _, body) = call(
            state,
            "GET",
            "/api/admin/orders?status=paid%26limit%3D100000",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "page=1&limit=20&status=paid%26limit%3D100000");
    }

    #[tokio::test]
    async fn test_passthrough() {
        let state = state_with_backends(&backend().await, &unreachable_url().await, false);

        let (status, _, body) = call(
            state.clone(),
            "GET",
            "/api/admin/products?page=3",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth"], "Bearer t");
        assert_eq!(body["query"], "page=3");

        let (status, _, body) = call(
            state.clone(),
            "POST",
            "/api/admin/products",
            Some("admin_token=t"),
            Some(json!({"title": "Koala Plush"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"], "Koala Plush");

        let (status, _, body) = call(
            state,
            "DELETE",
            "/api/admin/products/p1",
            Some("admin_token=t"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }
}
