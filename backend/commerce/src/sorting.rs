use serde::Serialize;

/// Products carrying this tag never show up in listings.
pub const HIDDEN_PRODUCT_TAG: &str = "nextjs-frontend-hidden";

/// Variant title used by backends for products without options.
pub const DEFAULT_OPTION: &str = "Default Title";

pub const SORT_RELEVANCE: &str = "RELEVANCE";
pub const SORT_BEST_SELLING: &str = "BEST_SELLING";
pub const SORT_CREATED_AT: &str = "CREATED_AT";
pub const SORT_PRICE: &str = "PRICE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortFilterItem {
    pub title: &'static str,
    pub slug: Option<&'static str>,
    pub sort_key: &'static str,
    pub reverse: bool,
}

pub const DEFAULT_SORT: SortFilterItem = SortFilterItem {
    title: "Relevance",
    slug: None,
    sort_key: SORT_RELEVANCE,
    reverse: false,
};

pub const SORTING: [SortFilterItem; 5] = [
    DEFAULT_SORT,
    SortFilterItem {
        title: "Trending",
        slug: Some("trending-desc"),
        sort_key: SORT_BEST_SELLING,
        reverse: false,
    },
    SortFilterItem {
        title: "Latest arrivals",
        slug: Some("latest-desc"),
        sort_key: SORT_CREATED_AT,
        reverse: true,
    },
    SortFilterItem {
        title: "Price: Low to high",
        slug: Some("price-asc"),
        sort_key: SORT_PRICE,
        reverse: false,
    },
    SortFilterItem {
        title: "Price: High to low",
        slug: Some("price-desc"),
        sort_key: SORT_PRICE,
        reverse: true,
    },
];

/// Unknown or missing slugs sort by relevance.
pub fn sort_for(slug: Option<&str>) -> SortFilterItem {
    slug.and_then(|slug| SORTING.iter().find(|item| item.slug == Some(slug)))
        .copied()
        .unwrap_or(DEFAULT_SORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_slugs() {
        let sort = sort_for(Some("price-desc"));
        assert_eq!(sort.sort_key, SORT_PRICE);
        assert!(sort.reverse);

        assert_eq!(sort_for(Some("latest-desc")).sort_key, SORT_CREATED_AT);
    }

    #[test]
    fn test_fallback_to_relevance() {
        assert_eq!(sort_for(None), DEFAULT_SORT);
        assert_eq!(sort_for(Some("cheapest")), DEFAULT_SORT);
    }
}
