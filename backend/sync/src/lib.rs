//! # Catalog Sync
//!
//! Snapshots a custom backend into a JSON [`Catalog`] the local provider can
//! serve with `LOCAL_CATALOG_PATH`, so the storefront runs without the backend.
//!
//! ## Steps
//! 1. Fetch every product and every collection.
//! 2. Fetch each collection's products, in backend order.
//! 3. Fetch the header and footer menus.
//! 4. Clean all handles so they are url-safe, keeping collection membership in sync.
//! 5. Stamp the snapshot and write it out.
use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use commerce::{
    CommerceProvider,
    api::ApiClient,
    providers::{
        custom::CustomProvider,
        local::{FOOTER_MENU, HEADER_MENU},
    },
    types::{Catalog, CollectionQuery, ProductQuery},
};
use indicatif::{ProgressBar, ProgressStyle};

pub mod utils;

use utils::clean_handle;

pub async fn sync_catalog(base_url: &str, output: &Path) -> Result<Catalog> {
    println!("Fetching catalog from {base_url}\n");

    let mut catalog = fetch_catalog(&CustomProvider::new(ApiClient::new(base_url))).await?;
    clean_catalog(&mut catalog);

    println!("Products: {}", catalog.products.len());
    println!("Collections: {}", catalog.collections.len());
    println!("Menus: {}\n", catalog.menus.len());

    write_catalog(&catalog, output).await?;
    println!("Wrote {}", output.display());

    Ok(catalog)
}

pub async fn fetch_catalog(provider: &dyn CommerceProvider) -> Result<Catalog> {
    let products = provider.get_products(&ProductQuery::default()).await?;
    if products.is_empty() {
        bail!("Backend returned no products, refusing to write an empty catalog");
    }

    let collections = provider.get_collections().await?;
    // The synthetic "All" entry has no handle and no member list of its own.
    let listed: Vec<_> = collections
        .iter()
        .filter(|collection| !collection.handle.is_empty())
        .collect();

    let pb = ProgressBar::new(listed.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut catalog = Catalog {
        products,
        ..Default::default()
    };

    for collection in listed {
        pb.set_message(format!("Fetching {}", collection.handle));

        let members = provider
            .get_collection_products(&CollectionQuery {
                collection: collection.handle.clone(),
                ..Default::default()
            })
            .await?;

        catalog.collection_products.insert(
            collection.handle.clone(),
            members.into_iter().map(|product| product.handle).collect(),
        );

        pb.inc(1);
    }
    pb.finish_with_message("Done");

    catalog.collections = collections;

    for menu in [HEADER_MENU, FOOTER_MENU] {
        let items = provider.get_menu(menu).await?;
        if !items.is_empty() {
            catalog.menus.insert(menu.to_string(), items);
        }
    }

    catalog.generated_at = Some(Utc::now().to_rfc3339());

    Ok(catalog)
}

/// Rewrites product and collection handles in place. Entries whose handle
/// cleans down to nothing, or to a handle an earlier entry already took, are
/// dropped. The "All" collection is kept as is.
pub fn clean_catalog(catalog: &mut Catalog) {
    let mut renamed: HashMap<String, String> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();

    catalog.products.retain_mut(|product| {
        let cleaned = clean_handle(&product.handle);
        if cleaned.is_empty() {
            renamed.insert(product.handle.clone(), cleaned);
            return false;
        }

        if !taken.insert(cleaned.clone()) {
            println!("Skipping product {}: handle {cleaned} is taken", product.handle);
            renamed.insert(product.handle.clone(), String::new());
            return false;
        }

        renamed.insert(product.handle.clone(), cleaned.clone());
        product.handle = cleaned;
        true
    });

    taken.clear();
    catalog.collections.retain_mut(|collection| {
        if collection.handle.is_empty() {
            return true;
        }

        let cleaned = clean_handle(&collection.handle);
        if cleaned.is_empty() {
            return false;
        }

        if !taken.insert(cleaned.clone()) {
            println!("Skipping collection {}: handle {cleaned} is taken", collection.handle);
            return false;
        }

        collection.handle = cleaned;
        collection.path = format!("/search/{}", collection.handle);
        true
    });

    catalog.collection_products = std::mem::take(&mut catalog.collection_products)
        .into_iter()
        .map(|(collection, members)| {
            let members = members
                .iter()
                .map(|handle| {
                    renamed
                        .get(handle)
                        .cloned()
                        .unwrap_or_else(|| clean_handle(handle))
                })
                .filter(|handle| !handle.is_empty())
                .collect();

            (clean_handle(&collection), members)
        })
        .filter(|(collection, _)| !collection.is_empty())
        .collect();
}

pub async fn write_catalog(catalog: &Catalog, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(catalog)?;

    tokio::fs::write(output, json)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))
}

#[cfg(test)]
mod tests {
    use commerce::{
        providers::local::{FEATURED_COLLECTION, LocalProvider, builtin_catalog},
        types::Catalog,
    };

    use super::*;

    #[tokio::test]
    async fn test_fetch_from_provider() {
        let catalog = fetch_catalog(&LocalProvider::builtin()).await.unwrap();

        assert_eq!(catalog.products.len(), 6);
        assert_eq!(catalog.collections.len(), 3);
        assert_eq!(catalog.collection_products[FEATURED_COLLECTION].len(), 3);
        assert_eq!(catalog.menus[HEADER_MENU].len(), 4);
        assert!(catalog.generated_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_backend_is_rejected() {
        let empty = LocalProvider::new(Catalog::default());

        assert!(fetch_catalog(&empty).await.is_err());
    }

    #[test]
    fn test_clean_keeps_membership() {
        let mut catalog = builtin_catalog();
        catalog.products[0].handle = "Teddy_Bear Classic!".to_string();
        catalog.products[1].handle = "???".to_string();
        catalog.collections[1].handle = "Best Sellers".to_string();
        catalog.collection_products.insert(
            "Best Sellers".to_string(),
            vec!["Teddy_Bear Classic!".to_string(), "???".to_string()],
        );

        clean_catalog(&mut catalog);

        assert_eq!(catalog.products.len(), 5);
        assert_eq!(catalog.products[0].handle, "teddy-bear-classic");
        assert_eq!(catalog.collections[0].title, "All");
        assert_eq!(catalog.collections[1].path, "/search/best-sellers");
        assert_eq!(
            catalog.collection_products["best-sellers"],
            vec!["teddy-bear-classic".to_string()]
        );
    }

    #[test]
    fn test_clean_drops_colliding_handles() {
        let mut catalog = builtin_catalog();
        let first = catalog.products[0].id.clone();
        catalog.products[0].handle = "Bear Hug!".to_string();
        catalog.products[1].handle = "bear_hug".to_string();
        catalog.collection_products.insert(
            "picks".to_string(),
            vec!["Bear Hug!".to_string(), "bear_hug".to_string()],
        );

        clean_catalog(&mut catalog);

        let hugs: Vec<_> = catalog
            .products
            .iter()
            .filter(|product| product.handle == "bear-hug")
            .collect();
        assert_eq!(catalog.products.len(), 5);
        assert_eq!(hugs.len(), 1);
        assert_eq!(hugs[0].id, first);
        assert_eq!(
            catalog.collection_products["picks"],
            vec!["bear-hug".to_string()]
        );
    }

    #[tokio::test]
    async fn test_snapshot_loads_back() {
        let path = std::env::temp_dir().join(format!("catalog-{}.json", std::process::id()));
        let catalog = fetch_catalog(&LocalProvider::builtin()).await.unwrap();

        write_catalog(&catalog, &path).await.unwrap();
        let loaded = LocalProvider::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.catalog().products.len(), 6);
        assert_eq!(
            loaded.catalog().collection_products,
            catalog.collection_products
        );
        assert_eq!(loaded.catalog().generated_at, catalog.generated_at);
    }
}
