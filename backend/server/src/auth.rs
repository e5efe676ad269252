//! Customer sign-in, registration and order history.
//!
//! Login goes through the selected provider. Registration, the current-user
//! lookup and logout talk to the customer backend directly so they keep
//! working when the provider has no account support of its own.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use commerce::{
    CommerceError, Feature,
    transform::transform_user,
    types::{CheckoutRequest, Credentials, Order, User},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::{
    error::AppError,
    state::State,
    utils::{AUTH_COOKIE, now_millis, removal, session_cookie, session_from},
};

pub const TEST_TOKEN_PREFIX: &str = "test_user_token_";
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Maps a failed backend call onto the response the browser should see.
pub fn upstream_error(err: CommerceError, unreachable: &str) -> AppError {
    if err.is_unreachable() {
        error!("Backend unreachable: {err}");
        return AppError::Unavailable(unreachable.to_string());
    }

    match err {
        CommerceError::Api(api) => AppError::Upstream {
            status: api.status,
            message: api.message,
        },
        other => AppError::Commerce(other),
    }
}

fn test_user() -> User {
    User {
        id: "1".to_string(),
        email: "user@example.com".to_string(),
        first_name: Some("Test".to_string()),
        last_name: Some("User".to_string()),
        phone: None,
    }
}

pub async fn login_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let provider = state.commerce.require(Feature::CustomerAuth)?;

    let session = provider.login(&credentials).await?;
    let jar = jar.add(session_cookie(
        AUTH_COOKIE,
        session.token,
        state.config.secure_cookies(),
    ));

    Ok((
        jar,
        Json(AuthResponse {
            success: true,
            user: serde_json::to_value(session.user).map_err(CommerceError::from)?,
        }),
    ))
}

pub async fn register_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let (Some(email), Some(password)) = (
        payload.email.filter(|email| !email.is_empty()),
        payload.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    };

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let body = json!({
        "email": email,
        "password": password,
        "firstName": payload.first_name,
        "lastName": payload.last_name,
    });

    match state
        .backend
        .post::<Value>("/auth/register", Some(&body), None)
        .await
    {
        Ok(data) => {
            let Some(token) = data.get("token").and_then(Value::as_str) else {
                return Err(AppError::BadRequest("Registration failed".to_string()));
            };

            let jar = jar.add(session_cookie(
                AUTH_COOKIE,
                token,
                state.config.secure_cookies(),
            ));

            Ok((
                jar,
                Json(AuthResponse {
                    success: true,
                    user: data.get("user").cloned().unwrap_or_default(),
                }),
            ))
        }
        Err(e) if e.is_unreachable() && state.config.is_development() => {
            warn!("Backend unreachable, registering {email} as a local test user");

            let now = now_millis();
            let jar = jar.add(session_cookie(
                AUTH_COOKIE,
                format!("{TEST_TOKEN_PREFIX}{now}"),
                false,
            ));

            Ok((
                jar,
                Json(AuthResponse {
                    success: true,
                    user: json!({
                        "id": now.to_string(),
                        "email": email,
                        "firstName": payload.first_name.unwrap_or_default(),
                        "lastName": payload.last_name.unwrap_or_default(),
                    }),
                }),
            ))
        }
        Err(e) => Err(upstream_error(
            e,
            "Unable to reach the server, please try again later",
        )),
    }
}

pub async fn me_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(token) = session_from(&jar).auth_token else {
        return Err(AppError::Unauthorized("Not logged in".to_string()));
    };

    match state
        .backend
        .get::<Value>("/auth/me", &[], Some(&token))
        .await
    {
        Ok(data) => {
            let user = data.get("user").unwrap_or(&data);
            Ok(Json(transform_user(user)).into_response())
        }
        Err(e) if e.status() == Some(401) => {
            let jar = jar.remove(removal(AUTH_COOKIE));
            Ok((
                jar,
                AppError::Unauthorized("Failed to load user".to_string()),
            )
                .into_response())
        }
        Err(e)
            if e.is_unreachable()
                && state.config.is_development()
                && token.starts_with(TEST_TOKEN_PREFIX) =>
        {
            Ok(Json(test_user()).into_response())
        }
        Err(e) => Err(upstream_error(e, "Unable to reach the server")),
    }
}

pub async fn logout_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(token) = session_from(&jar).auth_token {
        if let Err(e) = state
            .backend
            .post::<Value>("/auth/logout", None, Some(&token))
            .await
        {
            warn!("Backend logout failed: {e}");
        }
    }

    (
        jar.remove(removal(AUTH_COOKIE)),
        Json(json!({ "success": true })),
    )
}

pub async fn orders_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
) -> Result<Json<Vec<Order>>, AppError> {
    let provider = state.commerce.require(Feature::Orders)?;
    let session = session_from(&jar);

    if session.auth_token.is_none() {
        return Err(AppError::Unauthorized("Not logged in".to_string()));
    }

    Ok(Json(provider.get_orders(&session).await?))
}

pub async fn order_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let provider = state.commerce.require(Feature::Orders)?;
    let session = session_from(&jar);

    if session.auth_token.is_none() {
        return Err(AppError::Unauthorized("Not logged in".to_string()));
    }

    provider
        .get_order(&session, &order_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))
}

pub async fn create_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Order>, AppError> {
    let provider = state.commerce.require(Feature::Orders)?;
    let session = session_from(&jar);

    if session.auth_token.is_none() {
        return Err(AppError::Unauthorized("Not logged in".to_string()));
    }

    Ok(Json(provider.create_order(&session, &request).await?))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{HeaderMap, Request, StatusCode, header},
        routing::{get, post},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::routes::{
        router,
        testing::{cart_state, local_state, spawn_upstream, state_with_backend, unreachable_url},
    };

    async fn call(
        state: Arc<State>,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut request = Request::builder().method(method).uri(uri);
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

    async fn backend() -> String {
        let app = Router::new()
            .route(
                "/auth/register",
                post(|Json(body): Json<Value>| async move {
                    if body["email"] == "taken@example.com" {
                        return Err((
                            StatusCode::CONFLICT,
                            Json(json!({"message": "Email already registered"})),
                        ));
                    }
                    Ok(Json(json!({
                        "data": {"token": "tok-new", "user": {"id": "7", "email": body["email"]}}
                    })))
                }),
            )
            .route(
                "/auth/me",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer good") => Ok(Json(
                            json!({"user": {"_id": "7", "email": "a@b.c", "first_name": "Ada"}}),
                        )),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            )
            .route("/auth/logout", post(|| async { StatusCode::NO_CONTENT }));

        spawn_upstream(app).await
    }

    #[tokio::test]
    async fn test_register_validation() {
        let state = local_state();

        let (status, _, body) = call(
            state.clone(),
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "a@b.c"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email and password are required");

        let (status, _, body) = call(
            state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "a@b.c", "password": "12345"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Password must be at least 6 characters");
    }

    #[tokio::test]
    async fn test_register_against_backend() {
        let state = state_with_backend(&backend().await, false);

        let (status, cookie, body) = call(
            state.clone(),
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "new@example.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().starts_with("auth_token=tok-new"));
        assert_eq!(body["user"]["email"], "new@example.com");

        let (status, _, body) = call(
            state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "taken@example.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email already registered");
    }

    #[tokio::test]
    async fn test_register_offline() {
        let offline = unreachable_url().await;
        let payload = json!({"email": "dev@example.com", "password": "secret1", "firstName": "Dev"});

        let (status, cookie, body) = call(
            state_with_backend(&offline, true),
            "POST",
            "/api/auth/register",
            None,
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().starts_with("auth_token=test_user_token_"));
        assert_eq!(body["user"]["firstName"], "Dev");
        assert_eq!(body["user"]["lastName"], "");

        let (status, _, _) = call(
            state_with_backend(&offline, false),
            "POST",
            "/api/auth/register",
            None,
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_me() {
        let state = state_with_backend(&backend().await, false);

        let (status, _, _) = call(state.clone(), "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) =
            call(state.clone(), "GET", "/api/auth/me", Some("auth_token=good"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "7");
        assert_eq!(body["firstName"], "Ada");

        let (status, cookie, _) =
            call(state, "GET", "/api/auth/me", Some("auth_token=stale"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(cookie.unwrap().starts_with("auth_token=;"));
    }

    #[tokio::test]
    async fn test_me_offline_test_user() {
        let offline = unreachable_url().await;

        let (status, _, body) = call(
            state_with_backend(&offline, true),
            "GET",
            "/api/auth/me",
            Some("auth_token=test_user_token_1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "user@example.com");

        let (status, _, _) = call(
            state_with_backend(&offline, true),
            "GET",
            "/api/auth/me",
            Some("auth_token=real-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_logout_always_clears() {
        let offline = unreachable_url().await;

        let (status, cookie, body) = call(
            state_with_backend(&offline, false),
            "POST",
            "/api/auth/logout",
            Some("auth_token=abc"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(cookie.unwrap().starts_with("auth_token=;"));
    }

    #[tokio::test]
    async fn test_login_through_provider() {
        let (status, _, _) = call(
            local_state(),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.c", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        let (state, _) = cart_state(false);
        let (status, cookie, body) = call(
            state.clone(),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.c", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().contains("Max-Age=604800"));
        assert_eq!(body["user"]["email"], "a@b.c");

        let (status, _, _) = call(
            state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@b.c", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_orders_need_login() {
        let (state, _) = cart_state(false);

        let (status, _, _) = call(state.clone(), "GET", "/api/orders", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) =
            call(state.clone(), "GET", "/api/orders", Some("auth_token=t"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _, _) =
            call(state, "GET", "/api/orders/o-404", Some("auth_token=t"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
