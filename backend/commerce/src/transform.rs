//! Backend payloads into storefront types.
//!
//! Backends disagree on field names (`_id`, `slug`, `snake_case`, bare prices),
//! so every field is looked up under each of its known aliases.
use chrono::Utc;
use serde_json::Value;

use crate::types::{
    Cart, CartCost, CartItem, Collection, Image, LineCost, Merchandise, Money, Order, OrderLine,
    OrderVariant, PriceRange, Product, ProductOption, ProductSummary, ProductVariant,
    SelectedOption, Seo, User,
};

pub const DEFAULT_CURRENCY: &str = "CNY";
const DEFAULT_IMAGE_SIZE: u32 = 800;
const DEFAULT_VARIANT_TITLE: &str = "Default";

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// First alias holding a non-empty value. Dotted keys walk into objects.
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let found = key
            .split('.')
            .try_fold(value, |current, part| current.get(part))?;

        match found {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            other => Some(other),
        }
    })
}

fn text(value: &Value, keys: &[&str]) -> Option<String> {
    field(value, keys).and_then(|found| match found {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn text_or_default(value: &Value, keys: &[&str]) -> String {
    text(value, keys).unwrap_or_default()
}

fn flag(value: &Value, keys: &[&str], default: bool) -> bool {
    field(value, keys)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn count(value: &Value, keys: &[&str]) -> Option<u32> {
    field(value, keys)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn list<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    field(value, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn money_or_zero(value: &Value, keys: &[&str]) -> Money {
    field(value, keys)
        .map(transform_money)
        .unwrap_or_else(|| Money::zero(DEFAULT_CURRENCY))
}

fn selected_options(value: &Value, keys: &[&str]) -> Vec<SelectedOption> {
    list(value, keys)
        .iter()
        .filter_map(|option| {
            Some(SelectedOption {
                name: text(option, &["name"])?,
                value: text(option, &["value"])?,
            })
        })
        .collect()
}

fn seo(value: &Value, title: &str, description: &str) -> Seo {
    Seo {
        title: text(value, &["seo.title"]).unwrap_or_else(|| title.to_string()),
        description: text(value, &["seo.description"]).unwrap_or_else(|| description.to_string()),
    }
}

pub fn transform_money(value: &Value) -> Money {
    match value {
        Value::String(amount) => Money::new(amount.clone(), DEFAULT_CURRENCY),
        Value::Number(amount) => Money::new(amount.to_string(), DEFAULT_CURRENCY),
        other => Money::new(
            text(other, &["amount", "value"]).unwrap_or_else(|| "0".to_string()),
            text(other, &["currencyCode", "currency"])
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        ),
    }
}

pub fn transform_image(value: &Value) -> Image {
    if let Value::String(url) = value {
        return Image {
            url: url.clone(),
            alt_text: String::new(),
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
        };
    }

    Image {
        url: text_or_default(value, &["url", "src"]),
        alt_text: text_or_default(value, &["altText", "alt"]),
        width: count(value, &["width"]).unwrap_or(DEFAULT_IMAGE_SIZE),
        height: count(value, &["height"]).unwrap_or(DEFAULT_IMAGE_SIZE),
    }
}

fn featured_image(value: &Value, keys: &[&str]) -> Option<Image> {
    field(value, keys).map(transform_image)
}

fn transform_variant(value: &Value) -> ProductVariant {
    ProductVariant {
        id: text_or_default(value, &["id", "_id"]),
        title: text(value, &["title", "name"]).unwrap_or_else(|| DEFAULT_VARIANT_TITLE.to_string()),
        available_for_sale: flag(value, &["availableForSale", "inStock"], true),
        selected_options: selected_options(value, &["selectedOptions", "options"]),
        price: money_or_zero(value, &["price"]),
    }
}

fn transform_option(value: &Value) -> Option<ProductOption> {
    Some(ProductOption {
        id: text(value, &["id", "name"])?,
        name: text(value, &["name"])?,
        values: list(value, &["values"])
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    })
}

pub fn transform_product(value: &Value) -> Product {
    let title = text_or_default(value, &["title", "name"]);
    let description = text_or_default(value, &["description"]);

    Product {
        id: text_or_default(value, &["id", "_id"]),
        handle: text_or_default(value, &["handle", "slug"]),
        available_for_sale: flag(value, &["availableForSale", "inStock"], true),
        description_html: text(value, &["descriptionHtml"]).unwrap_or_else(|| description.clone()),
        options: list(value, &["options"])
            .iter()
            .filter_map(transform_option)
            .collect(),
        price_range: PriceRange {
            min_variant_price: money_or_zero(
                value,
                &["priceRange.minVariantPrice", "minPrice", "price"],
            ),
            max_variant_price: money_or_zero(
                value,
                &["priceRange.maxVariantPrice", "maxPrice", "price"],
            ),
        },
        variants: list(value, &["variants"])
            .iter()
            .map(transform_variant)
            .collect(),
        featured_image: featured_image(value, &["featuredImage"]),
        images: list(value, &["images"]).iter().map(transform_image).collect(),
        seo: seo(value, &title, &description),
        tags: list(value, &["tags"])
            .iter()
            .filter_map(|tag| tag.as_str().map(str::to_string))
            .collect(),
        updated_at: text(value, &["updatedAt", "updated_at"]).unwrap_or_else(now),
        title,
        description,
    }
}

pub fn transform_collection(value: &Value) -> Collection {
    let handle = text_or_default(value, &["handle", "slug", "id"]);
    let title = text_or_default(value, &["title", "name"]);
    let description = text_or_default(value, &["description"]);
    let path = text(value, &["path"]).unwrap_or_else(|| format!("/search/{handle}"));

    Collection {
        seo: seo(value, &title, &description),
        path,
        updated_at: text(value, &["updatedAt", "updated_at"]).unwrap_or_else(now),
        handle,
        title,
        description,
    }
}

fn transform_cart_item(value: &Value) -> CartItem {
    CartItem {
        id: text(value, &["id", "_id"]),
        quantity: count(value, &["quantity"]).unwrap_or(0),
        cost: LineCost {
            total_amount: money_or_zero(value, &["cost.totalAmount", "total"]),
        },
        merchandise: Merchandise {
            id: text_or_default(value, &["merchandise.id", "variantId", "variant_id"]),
            title: text(value, &["merchandise.title", "variantTitle"])
                .unwrap_or_else(|| DEFAULT_VARIANT_TITLE.to_string()),
            selected_options: selected_options(
                value,
                &["merchandise.selectedOptions", "options"],
            ),
            product: ProductSummary {
                id: text_or_default(
                    value,
                    &["merchandise.product.id", "product.id", "productId", "product_id"],
                ),
                handle: text_or_default(
                    value,
                    &[
                        "merchandise.product.handle",
                        "product.handle",
                        "productHandle",
                        "product_handle",
                    ],
                ),
                title: text_or_default(
                    value,
                    &[
                        "merchandise.product.title",
                        "product.title",
                        "productTitle",
                        "product_title",
                    ],
                ),
                featured_image: featured_image(
                    value,
                    &["merchandise.product.featuredImage", "product.featuredImage"],
                ),
            },
        },
    }
}

pub fn transform_cart(value: &Value) -> Cart {
    let lines: Vec<CartItem> = list(value, &["lines", "items"])
        .iter()
        .map(transform_cart_item)
        .collect();
    let total_quantity = count(value, &["totalQuantity", "total_quantity"])
        .filter(|quantity| *quantity > 0)
        .unwrap_or_else(|| lines.iter().map(|line| line.quantity).sum());

    Cart {
        id: text(value, &["id", "_id"]),
        checkout_url: text_or_default(value, &["checkoutUrl", "checkout_url"]),
        cost: CartCost {
            subtotal_amount: money_or_zero(value, &["cost.subtotalAmount", "subtotal"]),
            total_amount: money_or_zero(value, &["cost.totalAmount", "total"]),
            total_tax_amount: money_or_zero(value, &["cost.totalTaxAmount", "tax"]),
        },
        lines,
        total_quantity,
    }
}

fn transform_order_line(value: &Value) -> OrderLine {
    OrderLine {
        id: text_or_default(value, &["id", "_id"]),
        title: text_or_default(value, &["title", "name"]),
        quantity: count(value, &["quantity"]).unwrap_or(0),
        variant: OrderVariant {
            id: text_or_default(value, &["variant.id", "variantId"]),
            title: text_or_default(value, &["variant.title", "variantTitle"]),
            price: money_or_zero(value, &["variant.price", "price"]),
        },
        product: ProductSummary {
            id: text_or_default(value, &["product.id", "productId"]),
            handle: text_or_default(value, &["product.handle", "productHandle"]),
            title: text_or_default(value, &["product.title", "productTitle"]),
            featured_image: featured_image(value, &["product.featuredImage"]),
        },
    }
}

pub fn transform_order(value: &Value) -> Order {
    Order {
        id: text_or_default(value, &["id", "_id"]),
        order_number: text_or_default(value, &["orderNumber", "order_number", "id"]),
        total_price: money_or_zero(value, &["totalPrice", "total"]),
        status: text(value, &["status"]).unwrap_or_else(|| "pending".to_string()),
        created_at: text(value, &["createdAt", "created_at"]).unwrap_or_else(now),
        line_items: list(value, &["lineItems", "items"])
            .iter()
            .map(transform_order_line)
            .collect(),
    }
}

pub fn transform_user(value: &Value) -> User {
    User {
        id: text_or_default(value, &["id", "_id"]),
        email: text_or_default(value, &["email"]),
        first_name: text(value, &["firstName", "first_name"]),
        last_name: text(value, &["lastName", "last_name"]),
        phone: text(value, &["phone"]),
    }
}

pub fn transform_list<T>(value: &Value, transform: impl Fn(&Value) -> T) -> Vec<T> {
    value
        .as_array()
        .map(|items| items.iter().map(transform).collect())
        .unwrap_or_default()
}
