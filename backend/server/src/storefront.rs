use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State as AxumState},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use commerce::{
    CommerceFeatures, Feature,
    providers::local::{CAROUSEL_COLLECTION, FEATURED_COLLECTION, HEADER_MENU},
    sorting::{SORTING, SortFilterItem, sort_for},
    types::{Collection, CollectionQuery, Menu, Page, Product, ProductQuery},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::{error::AppError, locale::Locale, state::State};

const FEATURED_COUNT: usize = 3;
const TOPIC_HEADER: &str = "x-shopify-topic";

#[derive(Serialize)]
pub struct Layout {
    pub locale: &'static str,
    pub features: CommerceFeatures,
    pub menu: Vec<Menu>,
}

#[derive(Serialize)]
pub struct HomeView {
    pub layout: Layout,
    pub featured: Vec<Product>,
    pub carousel: Vec<Product>,
}

#[derive(Serialize)]
pub struct ProductView {
    pub layout: Layout,
    pub product: Product,
    pub recommendations: Vec<Product>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub layout: Layout,
    pub query: Option<String>,
    pub summary: Option<String>,
    pub products: Vec<Product>,
    pub collections: Vec<Collection>,
    pub sorting: &'static [SortFilterItem],
    pub active_sort: SortFilterItem,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionView {
    pub layout: Layout,
    pub collection: Collection,
    pub products: Vec<Product>,
    pub collections: Vec<Collection>,
    pub sorting: &'static [SortFilterItem],
    pub active_sort: SortFilterItem,
}

#[derive(Serialize)]
pub struct PageView {
    pub layout: Layout,
    pub page: Page,
}

#[derive(Deserialize, Default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub sort: Option<String>,
}

#[derive(Deserialize)]
pub struct RevalidateParams {
    pub secret: Option<String>,
}

async fn layout(state: &State, locale: Locale) -> Layout {
    let menu = state
        .commerce
        .provider()
        .get_menu(HEADER_MENU)
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to load menu: {e}");
            Vec::new()
        });

    Layout {
        locale: locale.code,
        features: state.commerce.features(),
        menu,
    }
}

async fn collections(state: &State) -> Result<Vec<Collection>, AppError> {
    if !state.commerce.is_enabled(Feature::Collections) {
        return Ok(Vec::new());
    }

    Ok(state.commerce.provider().get_collections().await?)
}

pub fn search_summary(query: Option<&str>, count: usize) -> Option<String> {
    let query = query.filter(|query| !query.is_empty())?;

    Some(match count {
        0 => format!("There are no products that match \"{query}\""),
        1 => format!("Showing 1 result for \"{query}\""),
        n => format!("Showing {n} results for \"{query}\""),
    })
}

pub async fn home_handler(
    AxumState(state): AxumState<Arc<State>>,
    Extension(locale): Extension<Locale>,
) -> Result<Json<HomeView>, AppError> {
    let provider = state.commerce.provider();

    let mut featured = provider
        .get_collection_products(&CollectionQuery {
            collection: FEATURED_COLLECTION.to_string(),
            ..Default::default()
        })
        .await?;
    featured.truncate(FEATURED_COUNT);

    let carousel = provider
        .get_collection_products(&CollectionQuery {
            collection: CAROUSEL_COLLECTION.to_string(),
            ..Default::default()
        })
        .await?;

    Ok(Json(HomeView {
        layout: layout(&state, locale).await,
        featured,
        carousel,
    }))
}

pub async fn product_handler(
    AxumState(state): AxumState<Arc<State>>,
    Extension(locale): Extension<Locale>,
    Path((_, handle)): Path<(String, String)>,
) -> Result<Json<ProductView>, AppError> {
    let provider = state.commerce.provider();

    let product = provider
        .get_product(&handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {handle} not found")))?;

    let recommendations = if state.commerce.is_enabled(Feature::ProductRecommendations) {
        provider.get_product_recommendations(&product.id).await?
    } else {
        Vec::new()
    };

    Ok(Json(ProductView {
        layout: layout(&state, locale).await,
        product,
        recommendations,
    }))
}

pub async fn search_handler(
    AxumState(state): AxumState<Arc<State>>,
    Extension(locale): Extension<Locale>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchView>, AppError> {
    if !state.commerce.is_enabled(Feature::Search) {
        return Err(AppError::NotFound("Search is not available".to_string()));
    }

    let active_sort = sort_for(params.sort.as_deref());
    let query = params.q.filter(|q| !q.trim().is_empty());

    let products = state
        .commerce
        .provider()
        .get_products(&ProductQuery {
            query: query.clone(),
            sort_key: Some(active_sort.sort_key.to_string()),
            reverse: active_sort.reverse,
        })
        .await?;

    Ok(Json(SearchView {
        layout: layout(&state, locale).await,
        summary: search_summary(query.as_deref(), products.len()),
        query,
        products,
        collections: collections(&state).await?,
        sorting: &SORTING,
        active_sort,
    }))
}

pub async fn collection_handler(
    AxumState(state): AxumState<Arc<State>>,
    Extension(locale): Extension<Locale>,
    Path((_, handle)): Path<(String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<CollectionView>, AppError> {
    let provider = state.commerce.provider();

    let collection = provider
        .get_collection(&handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Collection {handle} not found")))?;

    let active_sort = sort_for(params.sort.as_deref());
    let products = provider
        .get_collection_products(&CollectionQuery {
            collection: handle,
            sort_key: Some(active_sort.sort_key.to_string()),
            reverse: active_sort.reverse,
        })
        .await?;

    Ok(Json(CollectionView {
        layout: layout(&state, locale).await,
        collection,
        products,
        collections: collections(&state).await?,
        sorting: &SORTING,
        active_sort,
    }))
}

pub async fn page_handler(
    AxumState(state): AxumState<Arc<State>>,
    Extension(locale): Extension<Locale>,
    Path((_, handle)): Path<(String, String)>,
) -> Result<Json<PageView>, AppError> {
    let page = state
        .commerce
        .provider()
        .get_page(&handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Page {handle} not found")))?;

    Ok(Json(PageView {
        layout: layout(&state, locale).await,
        page,
    }))
}

pub async fn features_handler(AxumState(state): AxumState<Arc<State>>) -> impl IntoResponse {
    Json(state.commerce.features())
}

pub async fn revalidate_handler(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    Query(params): Query<RevalidateParams>,
) -> Result<impl IntoResponse, AppError> {
    let topic = headers
        .get(TOPIC_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .commerce
        .provider()
        .revalidate(topic, params.secret.as_deref())
        .await?;
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);

    Ok((
        status,
        Json(json!({
            "revalidated": outcome.revalidated,
            "now": Utc::now().timestamp_millis(),
        })),
    ))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::{router, testing::local_state};

    async fn get(uri: &str) -> (StatusCode, Value) {
        let response = router(local_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    #[test]
    fn test_search_summary() {
        assert_eq!(search_summary(None, 3), None);
        assert_eq!(
            search_summary(Some("bear"), 0).unwrap(),
            "There are no products that match \"bear\""
        );
        assert_eq!(
            search_summary(Some("bear"), 1).unwrap(),
            "Showing 1 result for \"bear\""
        );
        assert_eq!(
            search_summary(Some("plush"), 6).unwrap(),
            "Showing 6 results for \"plush\""
        );
    }

    #[tokio::test]
    async fn test_home() {
        let (status, body) = get("/en").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["layout"]["locale"], "en");
        assert_eq!(body["layout"]["features"]["search"], true);
        assert_eq!(body["layout"]["menu"].as_array().unwrap().len(), 4);
        assert_eq!(body["featured"].as_array().unwrap().len(), 3);
        assert_eq!(body["carousel"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_product_page() {
        let (status, body) = get("/zh/product/panda-plush").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["product"]["title"], "Giant Panda Plush");
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 4);

        let (status, body) = get("/zh/product/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Product nope not found");
    }

    #[tokio::test]
    async fn test_search_sorted() {
        let (status, body) = get("/de/search?q=plush&sort=price-desc").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["products"][0]["handle"], "panda-plush");
        assert_eq!(body["summary"], "Showing 6 results for \"plush\"");
        assert_eq!(body["activeSort"]["slug"], "price-desc");
        assert_eq!(body["collections"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_collection_page() {
        let (status, body) = get("/en/search/hidden-homepage-featured-items").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collection"]["title"], "Featured");
        assert_eq!(body["products"].as_array().unwrap().len(), 3);

        let (status, _) = get("/en/search/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cms_page_missing() {
        let (status, _) = get("/fr/about").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_features_and_revalidate() {
        let (status, body) = get("/api/features").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"], false);
        assert_eq!(body["productRecommendations"], true);

        let response = router(local_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/revalidate?secret=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
