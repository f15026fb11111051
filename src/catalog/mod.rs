//! Product catalog listing.

pub mod query;

pub use query::{ComparisonOp, FieldFilter, FilterValue, ProductQuery, QuerySpec};

use crate::db::{DbPool, ProductPage, ProductResponse};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown filter field: {0}")]
    UnknownField(String),

    #[error("Operator '{op}' is not supported for {field}")]
    UnsupportedOperator { field: String, op: String },

    #[error("Filter {field} expects a number, got '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl QueryError {
    /// Query parameter the error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryError::UnknownField(field) => Some(field),
            QueryError::UnsupportedOperator { field, .. } => Some(field),
            QueryError::InvalidNumber { field, .. } => Some(field),
            QueryError::Database(_) => None,
        }
    }
}

/// Run a search + filter + pagination listing and assemble the page
pub async fn list_products(
    pool: &DbPool,
    spec: &QuerySpec,
    per_page: u32,
    include_deleted: bool,
) -> Result<ProductPage, QueryError> {
    let query = ProductQuery::new(spec)
        .search()
        .filter()
        .include_deleted(include_deleted)
        .pagination(per_page);

    let products_count = query.count(pool).await?;
    let products: Vec<ProductResponse> = query
        .fetch(pool)
        .await?
        .into_iter()
        .map(ProductResponse::from)
        .collect();

    let per_page = per_page.max(1) as i64;
    let total_pages = ((products_count + per_page - 1) / per_page).max(1) as u32;

    Ok(ProductPage {
        current_page: query.current_page(),
        total_pages,
        products_count,
        products_length: products.len(),
        products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now_timestamp, search_key, test_pool};

    async fn insert_product(
        pool: &DbPool,
        name: &str,
        category: &str,
        price: f64,
        seller: &str,
        deleted: bool,
    ) {
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO products (id, name, price, description, category, seller, stock, is_deleted, \
             name_search, category_search, created_at, updated_at) \
             VALUES (?, ?, ?, 'desc', ?, ?, 5, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(price)
        .bind(category)
        .bind(seller)
        .bind(deleted)
        .bind(search_key(name))
        .bind(search_key(category))
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seeded_pool() -> DbPool {
        let pool = test_pool().await;
        for i in 1..=10 {
            insert_product(
                &pool,
                &format!("Product {i}"),
                "Laptops",
                i as f64 * 50.0,
                "Amazon",
                false,
            )
            .await;
        }
        insert_product(&pool, "SanDisk Extreme Camera Card", "Cameras", 45.0, "Ebay", false).await;
        insert_product(&pool, "Retired Camera", "Cameras", 300.0, "Ebay", true).await;
        pool
    }

    fn spec(items: &[(&str, &str)]) -> QuerySpec {
        QuerySpec::from_pairs(items.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[tokio::test]
    async fn test_pages_partition_the_listing() {
        let pool = seeded_pool().await;

        let mut seen = Vec::new();
        for page in 1..=3 {
            let page_str = page.to_string();
            let result = list_products(&pool, &spec(&[("page", &page_str)]), 4, false)
                .await
                .unwrap();
            assert_eq!(result.current_page, page);
            assert_eq!(result.products_count, 11);
            assert_eq!(result.total_pages, 3);
            assert!(result.products_length <= 4);
            seen.extend(result.products.into_iter().map(|p| p.id));
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 11);
    }

    #[tokio::test]
    async fn test_invalid_page_reads_as_first() {
        let pool = seeded_pool().await;
        let first = list_products(&pool, &spec(&[]), 4, false).await.unwrap();

        for page in ["0", "-2", "abc"] {
            let result = list_products(&pool, &spec(&[("page", page)]), 4, false)
                .await
                .unwrap();
            assert_eq!(result.current_page, 1);
            let ids: Vec<_> = result.products.iter().map(|p| &p.id).collect();
            let expected: Vec<_> = first.products.iter().map(|p| &p.id).collect();
            assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn test_price_filter_is_strict() {
        let pool = seeded_pool().await;
        let result = list_products(&pool, &spec(&[("price[gt]", "100")]), 50, false)
            .await
            .unwrap();

        assert_eq!(result.products_count, 8);
        assert!(result.products.iter().all(|p| p.price > 100.0));
    }

    #[tokio::test]
    async fn test_keyword_and_category_search() {
        let pool = seeded_pool().await;

        let result = list_products(&pool, &spec(&[("keyword", "sandisk")]), 50, false)
            .await
            .unwrap();
        assert_eq!(result.products_length, 1);
        assert_eq!(result.products[0].name, "SanDisk Extreme Camera Card");

        let result = list_products(
            &pool,
            &spec(&[("keyword", "camera"), ("category", "cameras")]),
            50,
            false,
        )
        .await
        .unwrap();
        assert_eq!(result.products_length, 1);

        let result = list_products(&pool, &spec(&[("keyword", "%")]), 50, false)
            .await
            .unwrap();
        assert_eq!(result.products_count, 0);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let pool = test_pool().await;
        insert_product(&pool, "Éclair Électrique", "Electronics", 20.0, "Ebay", false).await;

        for keyword in ["éclair", "ÉCLAIR", "Éclair", "électrique"] {
            let result = list_products(&pool, &spec(&[("keyword", keyword)]), 50, false)
                .await
                .unwrap();
            assert_eq!(result.products_count, 1, "keyword {keyword}");
        }
    }

    #[tokio::test]
    async fn test_soft_deleted_products_are_hidden_unless_requested() {
        let pool = seeded_pool().await;
        let filters = [("seller", "Ebay")];

        let visible = list_products(&pool, &spec(&filters), 50, false).await.unwrap();
        assert_eq!(visible.products_count, 1);

        let all = list_products(&pool, &spec(&filters), 50, true).await.unwrap();
        assert_eq!(all.products_count, 2);
        assert!(all.products.iter().any(|p| p.is_deleted));
    }

    #[tokio::test]
    async fn test_empty_catalog_has_one_empty_page() {
        let pool = test_pool().await;
        let result = list_products(&pool, &spec(&[]), 4, false).await.unwrap();
        assert_eq!(result.products_count, 0);
        assert_eq!(result.total_pages, 1);
        assert!(result.products.is_empty());
    }
}
