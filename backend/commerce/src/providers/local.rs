//! # Local Provider
//!
//! Serves a fixed plush-toy catalog from memory so the storefront runs without
//! any backend. A snapshot written by `catalog-sync` can replace the built-in
//! data.
//!
//! Cart, customer accounts and orders are not available here.
use std::{fs, path::Path};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::{
    error::{CommerceError, Result},
    features::{CommerceFeatures, Feature},
    provider::CommerceProvider,
    sorting::SORT_PRICE,
    types::{
        AuthSession, Cart, CartLineInput, CartLineUpdate, Catalog, CheckoutRequest, Collection,
        CollectionQuery, Credentials, Image, Menu, Money, Order, Page, PriceRange, Product,
        ProductOption, ProductQuery, ProductVariant, Registration, SelectedOption, Seo, Session,
        User,
    },
};

pub const FEATURED_COLLECTION: &str = "hidden-homepage-featured-items";
pub const CAROUSEL_COLLECTION: &str = "hidden-homepage-carousel";
pub const HEADER_MENU: &str = "next-js-frontend-header-menu";
pub const FOOTER_MENU: &str = "next-js-frontend-footer-menu";

const CURRENCY: &str = "CNY";
const FEATURED_COUNT: usize = 3;
const RECOMMENDATION_COUNT: usize = 4;

pub struct LocalProvider {
    catalog: Catalog,
}

impl LocalProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_catalog())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&contents)?;

        info!(
            "Loaded catalog snapshot {} ({} products, {} collections)",
            path.display(),
            catalog.products.len(),
            catalog.collections.len()
        );

        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn sorted(
        &self,
        mut products: Vec<Product>,
        sort_key: Option<&str>,
        reverse: bool,
    ) -> Vec<Product> {
        if sort_key == Some(SORT_PRICE) {
            products.sort_by(|a, b| {
                let a = a.price_range.min_variant_price.value();
                let b = b.price_range.min_variant_price.value();
                if reverse { b.total_cmp(&a) } else { a.total_cmp(&b) }
            });
        }

        products
    }

    fn products_by_handle(&self, handles: &[String]) -> Vec<Product> {
        handles
            .iter()
            .filter_map(|handle| {
                self.catalog
                    .products
                    .iter()
                    .find(|product| &product.handle == handle)
                    .cloned()
            })
            .collect()
    }
}

#[async_trait]
impl CommerceProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn features(&self) -> CommerceFeatures {
        CommerceFeatures {
            search: true,
            product_recommendations: true,
            collections: true,
            ..CommerceFeatures::none()
        }
    }

    async fn get_product(&self, handle: &str) -> Result<Option<Product>> {
        Ok(self
            .catalog
            .products
            .iter()
            .find(|product| product.handle == handle)
            .cloned())
    }

    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let needle = query
            .query
            .as_deref()
            .map(str::to_lowercase)
            .filter(|needle| !needle.is_empty());

        let products = self
            .catalog
            .products
            .iter()
            .filter(|product| match &needle {
                Some(needle) => {
                    product.title.to_lowercase().contains(needle)
                        || product.description.to_lowercase().contains(needle)
                }
                None => true,
            })
            .cloned()
            .collect();

        Ok(self.sorted(products, query.sort_key.as_deref(), query.reverse))
    }

    async fn get_product_recommendations(&self, product_id: &str) -> Result<Vec<Product>> {
        Ok(self
            .catalog
            .products
            .iter()
            .filter(|product| product.id != product_id)
            .take(RECOMMENDATION_COUNT)
            .cloned()
            .collect())
    }

    async fn get_collection(&self, handle: &str) -> Result<Option<Collection>> {
        Ok(self
            .catalog
            .collections
            .iter()
            .find(|collection| collection.handle == handle)
            .cloned())
    }

    async fn get_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.catalog.collections.clone())
    }

    async fn get_collection_products(&self, query: &CollectionQuery) -> Result<Vec<Product>> {
        if let Some(handles) = self.catalog.collection_products.get(&query.collection) {
            let products = self.products_by_handle(handles);
            return Ok(self.sorted(products, query.sort_key.as_deref(), query.reverse));
        }

        match query.collection.as_str() {
            FEATURED_COLLECTION => Ok(self
                .catalog
                .products
                .iter()
                .take(FEATURED_COUNT)
                .cloned()
                .collect()),
            CAROUSEL_COLLECTION => Ok(self.catalog.products.clone()),
            _ => {
                self.get_products(&ProductQuery {
                    query: None,
                    sort_key: query.sort_key.clone(),
                    reverse: query.reverse,
                })
                .await
            }
        }
    }

    async fn get_cart(&self, _session: &Session) -> Result<Option<Cart>> {
        Err(CommerceError::Unsupported(Feature::Cart))
    }

    async fn create_cart(&self, _session: &Session) -> Result<Cart> {
        Err(CommerceError::Unsupported(Feature::Cart))
    }

    async fn add_to_cart(&self, _session: &Session, _lines: &[CartLineInput]) -> Result<Cart> {
        Err(CommerceError::Unsupported(Feature::Cart))
    }

    async fn remove_from_cart(&self, _session: &Session, _line_ids: &[String]) -> Result<Cart> {
        Err(CommerceError::Unsupported(Feature::Cart))
    }

    async fn update_cart(&self, _session: &Session, _lines: &[CartLineUpdate]) -> Result<Cart> {
        Err(CommerceError::Unsupported(Feature::Cart))
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
        Ok(self.catalog.menus.get(handle).cloned().unwrap_or_default())
    }

    async fn get_page(&self, _handle: &str) -> Result<Option<Page>> {
        Ok(None)
    }

    async fn get_pages(&self) -> Result<Vec<Page>> {
        Ok(Vec::new())
    }
}

fn price(amount: &str) -> Money {
    Money::new(amount, CURRENCY)
}

fn image(handle: &str, suffix: &str, alt_text: &str) -> Image {
    Image {
        url: format!("/images/products/{handle}{suffix}.jpg"),
        alt_text: alt_text.to_string(),
        width: 800,
        height: 800,
    }
}

struct Plush<'a> {
    id: &'a str,
    handle: &'a str,
    title: &'a str,
    description: &'a str,
    details: &'a str,
    seo: (&'a str, &'a str),
    tags: [&'a str; 3],
}

impl Plush<'_> {
    /// `variants` are (id, title, option value, price); an empty option name means no options.
    fn build(self, option_name: &str, variants: &[(&str, &str, &str)], now: &str) -> Product {
        let variants: Vec<ProductVariant> = variants
            .iter()
            .map(|(id, title, amount)| ProductVariant {
                id: id.to_string(),
                title: title.to_string(),
                available_for_sale: true,
                selected_options: if option_name.is_empty() {
                    Vec::new()
                } else {
                    vec![SelectedOption {
                        name: option_name.to_string(),
                        value: title.to_string(),
                    }]
                },
                price: price(amount),
            })
            .collect();

        let options = if option_name.is_empty() {
            Vec::new()
        } else {
            vec![ProductOption {
                id: option_name.to_lowercase(),
                name: option_name.to_string(),
                values: variants.iter().map(|variant| variant.title.clone()).collect(),
            }]
        };

        let min = variants
            .iter()
            .map(|variant| &variant.price)
            .min_by(|a, b| a.value().total_cmp(&b.value()))
            .cloned()
            .unwrap_or_else(|| Money::zero(CURRENCY));
        let max = variants
            .iter()
            .map(|variant| &variant.price)
            .max_by(|a, b| a.value().total_cmp(&b.value()))
            .cloned()
            .unwrap_or_else(|| Money::zero(CURRENCY));

        let featured = image(self.handle, "", self.title);

        Product {
            id: self.id.to_string(),
            handle: self.handle.to_string(),
            available_for_sale: true,
            title: self.title.to_string(),
            description: self.description.to_string(),
            description_html: format!("<p>{} {}</p>", self.description, self.details),
            options,
            price_range: PriceRange {
                max_variant_price: max,
                min_variant_price: min,
            },
            variants,
            featured_image: Some(featured.clone()),
            images: vec![featured],
            seo: Seo {
                title: self.seo.0.to_string(),
                description: self.seo.1.to_string(),
            },
            tags: self.tags.iter().map(|tag| tag.to_string()).collect(),
            updated_at: now.to_string(),
        }
    }
}

fn collection(handle: &str, title: &str, description: &str, now: &str) -> Collection {
    Collection {
        handle: handle.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        seo: Seo {
            title: title.to_string(),
            description: description.to_string(),
        },
        path: if handle.is_empty() {
            "/search".to_string()
        } else {
            format!("/search/{handle}")
        },
        updated_at: now.to_string(),
    }
}

pub fn builtin_catalog() -> Catalog {
    let now = Utc::now().to_rfc3339();

    let mut teddy = Plush {
        id: "1",
        handle: "teddy-bear-classic",
        title: "Classic Teddy Bear",
        description: "A soft classic teddy bear made from premium plush, the perfect companion.",
        details: "Suitable for all ages and a great gift.",
        seo: (
            "Classic Teddy Bear - a soft, cuddly companion",
            "Premium plush teddy bear in several sizes",
        ),
        tags: ["teddy bear", "plush", "classic"],
    }
    .build(
        "Size",
        &[
            ("variant-1", "Small", "199.00"),
            ("variant-2", "Medium", "249.00"),
            ("variant-3", "Large", "299.00"),
        ],
        &now,
    );
    teddy
        .images
        .push(image("teddy-bear-classic", "-2", "Classic Teddy Bear - side"));

    let bunny = Plush {
        id: "2",
        handle: "bunny-plush",
        title: "Cute Bunny Plush",
        description: "A long-eared bunny in soft pastel colours, a favourite with kids.",
        details: "Made from safe, eco-friendly materials for ages 3 and up.",
        seo: (
            "Cute Bunny Plush - pastel long-eared bunny",
            "Adorable long-eared bunny plush in several colours",
        ),
        tags: ["bunny", "plush", "cute"],
    }
    .build(
        "Color",
        &[
            ("variant-4", "Pink", "189.00"),
            ("variant-5", "White", "189.00"),
            ("variant-6", "Grey", "189.00"),
        ],
        &now,
    );

    let single = |plush: Plush<'_>, variant_id: &str, amount: &str| {
        plush.build("", &[(variant_id, "Default", amount)], &now)
    };

    let panda = single(
        Plush {
            id: "3",
            handle: "panda-plush",
            title: "Giant Panda Plush",
            description: "A charming black-and-white panda, great to collect or to give.",
            details: "High quality plush with fine details.",
            seo: (
                "Giant Panda Plush - the national treasure",
                "Classic black and white panda plush",
            ),
            tags: ["panda", "plush", "treasure"],
        },
        "variant-7",
        "259.00",
    );

    let unicorn = single(
        Plush {
            id: "4",
            handle: "unicorn-plush",
            title: "Dreamy Unicorn",
            description: "A magical unicorn plush with a rainbow mane and a sparkling horn.",
            details: "Made from safe, premium materials.",
            seo: (
                "Dreamy Unicorn - a magical plush",
                "Rainbow-maned unicorn plush full of magic",
            ),
            tags: ["unicorn", "plush", "magic"],
        },
        "variant-8",
        "229.00",
    );

    let dinosaur = single(
        Plush {
            id: "5",
            handle: "dinosaur-plush",
            title: "Little Dinosaur Plush",
            description: "A cute green dinosaur with big eyes, ready to explore.",
            details: "A perfect bedtime companion.",
            seo: (
                "Little Dinosaur Plush - a cute green dino",
                "Big-eyed green dinosaur plush for kids",
            ),
            tags: ["dinosaur", "plush", "kids"],
        },
        "variant-9",
        "179.00",
    );

    let elephant = single(
        Plush {
            id: "6",
            handle: "elephant-plush",
            title: "Baby Elephant Plush",
            description: "A gentle grey baby elephant with a long trunk.",
            details: "Soft, safe fabric throughout.",
            seo: (
                "Baby Elephant Plush - gentle and cute",
                "Grey elephant plush with a long trunk",
            ),
            tags: ["elephant", "plush", "cute"],
        },
        "variant-10",
        "219.00",
    );

    let mut catalog = Catalog {
        products: vec![teddy, bunny, panda, unicorn, dinosaur, elephant],
        collections: vec![
            collection("", "All", "All products", &now),
            collection(FEATURED_COLLECTION, "Featured", "Homepage featured products", &now),
            collection(CAROUSEL_COLLECTION, "Popular", "Popular products carousel", &now),
        ],
        ..Default::default()
    };

    catalog.menus.insert(
        HEADER_MENU.to_string(),
        vec![
            Menu::new("Home", "/"),
            Menu::new("All products", "/search"),
            Menu::new("About", "/about"),
            Menu::new("Contact", "/contact"),
        ],
    );
    catalog.menus.insert(
        FOOTER_MENU.to_string(),
        vec![
            Menu::new("About", "/about"),
            Menu::new("Contact", "/contact"),
            Menu::new("Privacy", "/privacy"),
            Menu::new("Terms", "/terms"),
        ],
    );

    catalog
}
