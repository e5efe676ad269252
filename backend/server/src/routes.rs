use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{ACCEPT_LANGUAGE, CONTENT_TYPE},
    },
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    admin, auth, cart,
    locale::{locale_middleware, locales_handler, switch_locale_handler},
    state::State,
    storefront::{
        collection_handler, features_handler, home_handler, page_handler, product_handler,
        revalidate_handler, search_handler,
    },
};

fn admin_router() -> Router<Arc<State>> {
    Router::new()
        .route("/api/admin/me", get(admin::me))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/orders", get(admin::orders))
        .route(
            "/api/admin/orders/{id}",
            get(admin::passthrough).patch(admin::passthrough),
        )
        .route(
            "/api/admin/products",
            get(admin::passthrough).post(admin::passthrough),
        )
        .route(
            "/api/admin/products/{id}",
            get(admin::passthrough)
                .put(admin::passthrough)
                .delete(admin::passthrough),
        )
        .route(
            "/api/admin/collections",
            get(admin::passthrough).post(admin::passthrough),
        )
        .route(
            "/api/admin/collections/{id}",
            get(admin::passthrough)
                .put(admin::passthrough)
                .delete(admin::passthrough),
        )
        .route_layer(from_fn(admin::require_admin))
}

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT_LANGUAGE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(home_handler))
        .route("/{locale}", get(home_handler))
        .route("/{locale}/product/{handle}", get(product_handler))
        .route("/{locale}/search", get(search_handler))
        .route("/{locale}/search/{collection}", get(collection_handler))
        .route("/{locale}/{page}", get(page_handler))
        .route("/api/features", get(features_handler))
        .route("/api/revalidate", post(revalidate_handler))
        .route("/api/locales", get(locales_handler))
        .route("/api/locale", post(switch_locale_handler))
        .route("/api/cart", get(cart::get_cart_handler))
        .route(
            "/api/cart/items",
            post(cart::add_item_handler).patch(cart::update_item_handler),
        )
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route(
            "/api/orders",
            get(auth::orders_handler).post(auth::create_order_handler),
        )
        .route("/api/orders/{id}", get(auth::order_handler))
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/logout", post(admin::logout))
        .merge(admin_router())
        .layer(from_fn(locale_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use super::{testing::local_state, *};

    async fn send(request: Request<Body>) -> axum::response::Response {
        router(local_state()).oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_negotiated_locale() {
        let response = send(
            Request::builder()
                .uri("/?q=bear")
                .header(header::ACCEPT_LANGUAGE, "fr-FR,fr;q=0.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/fr?q=bear");
    }

    #[tokio::test]
    async fn test_cookie_beats_accept_language() {
        let response = send(
            Request::builder()
                .uri("/search")
                .header(header::COOKIE, "locale=it")
                .header(header::ACCEPT_LANGUAGE, "de")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/it/search");
    }

    #[tokio::test]
    async fn test_api_is_not_redirected() {
        let response = send(
            Request::builder()
                .uri("/api/locales")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_switch_locale() {
        let response = send(
            Request::builder()
                .method("POST")
                .uri("/api/locale")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"locale":"de","path":"/en/search"}"#))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("locale=de"));
        assert!(!cookie.contains("HttpOnly"));

        let response = send(
            Request::builder()
                .method("POST")
                .uri("/api/locale")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"locale":"xx"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
