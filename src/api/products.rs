use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{self, QuerySpec};
use crate::db::{
    now_timestamp, search_key, serialize_json_list, CreateProductRequest, Product, ProductPage,
    ProductResponse, UpdateProductRequest,
};
use crate::AppState;

use super::auth::MaybeUser;
use super::error::ApiError;
use super::response::ApiResponse;
use super::validation::{
    require_uuid, validate_category, validate_create_product, validate_update_product,
};

fn product_not_found() -> ApiError {
    ApiError::not_found("Product not found")
}

async fn find_product(state: &AppState, id: &str) -> Result<Product, ApiError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(product_not_found)
}

/// GET /api/v1/products
///
/// Search, filter and paginate. Soft-deleted products are only listed for
/// admins passing `includeDeleted=true`.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<ApiResponse<ProductPage>, ApiError> {
    let wants_deleted = params
        .iter()
        .any(|(k, v)| k == "includeDeleted" && v.eq_ignore_ascii_case("true"));
    let include_deleted = wants_deleted && viewer.is_admin();

    let spec = QuerySpec::from_pairs(params)?;
    let page = catalog::list_products(
        &state.db,
        &spec,
        state.config.catalog.per_page,
        include_deleted,
    )
    .await?;

    Ok(ApiResponse::ok(page))
}

/// GET /api/v1/product/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ProductResponse>, ApiError> {
    require_uuid(&id)?;
    let product = find_product(&state, &id).await?;
    Ok(ApiResponse::ok(ProductResponse::from(product)))
}

/// POST /api/v1/admin/product/new
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<ApiResponse<ProductResponse>, ApiError> {
    validate_create_product(&req)?;
    let category = validate_category(&req.category)
        .map_err(|e| ApiError::validation_field("category", e))?;

    let now = now_timestamp();
    let num_of_reviews = req.num_of_reviews.unwrap_or(req.reviews.len() as i64);

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (
            id, name, price, description, ratings, images, category, seller, stock,
            num_of_reviews, reviews, is_deleted, deleted_at, name_search, category_search,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(req.name.trim())
    .bind(req.price)
    .bind(&req.description)
    .bind(req.ratings)
    .bind(serialize_json_list(&req.images))
    .bind(category.as_str())
    .bind(req.seller.trim())
    .bind(req.stock)
    .bind(num_of_reviews)
    .bind(serialize_json_list(&req.reviews))
    .bind(search_key(&req.name))
    .bind(search_key(category.as_str()))
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok(ApiResponse::created(ProductResponse::from(product)))
}

/// PUT /api/v1/admin/product/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<ApiResponse<ProductResponse>, ApiError> {
    require_uuid(&id)?;
    validate_update_product(&req)?;

    let mut product = find_product(&state, &id).await?;

    if let Some(name) = req.name {
        product.name = name.trim().to_string();
    }
    if let Some(price) = req.price {
        product.price = price;
    }
    if let Some(description) = req.description {
        product.description = description;
    }
    if let Some(ratings) = req.ratings {
        product.ratings = ratings;
    }
    if let Some(images) = req.images {
        product.images = serialize_json_list(&images);
    }
    if let Some(category) = req.category {
        let category =
            validate_category(&category).map_err(|e| ApiError::validation_field("category", e))?;
        product.category = category.as_str().to_string();
    }
    if let Some(seller) = req.seller {
        product.seller = seller.trim().to_string();
    }
    if let Some(stock) = req.stock {
        product.stock = stock;
    }
    if let Some(reviews) = req.reviews {
        if req.num_of_reviews.is_none() {
            product.num_of_reviews = reviews.len() as i64;
        }
        product.reviews = serialize_json_list(&reviews);
    }
    if let Some(count) = req.num_of_reviews {
        product.num_of_reviews = count;
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            name = ?, price = ?, description = ?, ratings = ?, images = ?, category = ?,
            seller = ?, stock = ?, num_of_reviews = ?, reviews = ?,
            name_search = ?, category_search = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&product.name)
    .bind(product.price)
    .bind(&product.description)
    .bind(product.ratings)
    .bind(&product.images)
    .bind(&product.category)
    .bind(&product.seller)
    .bind(product.stock)
    .bind(product.num_of_reviews)
    .bind(&product.reviews)
    .bind(search_key(&product.name))
    .bind(search_key(&product.category))
    .bind(now_timestamp())
    .bind(&id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(product_not_found)?;

    tracing::info!(product_id = %product.id, "Product updated");
    Ok(ApiResponse::ok(ProductResponse::from(product)))
}

/// DELETE /api/v1/admin/product/softDelete/:id
pub async fn soft_delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ProductResponse>, ApiError> {
    require_uuid(&id)?;

    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET is_deleted = 1, deleted_at = ? WHERE id = ? AND is_deleted = 0 RETURNING *",
    )
    .bind(now_timestamp())
    .bind(&id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(product_not_found)?;

    tracing::info!(product_id = %product.id, "Product soft deleted");
    Ok(ApiResponse::ok(ProductResponse::from(product)).with_message("Product is soft deleted"))
}

/// DELETE /api/v1/admin/product/hardDelete/:id
pub async fn hard_delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    require_uuid(&id)?;

    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(product_not_found());
    }

    tracing::info!(product_id = %id, "Product permanently deleted");
    Ok(ApiResponse::message("Product is deleted"))
}

/// PATCH /api/v1/admin/product/restore/:id
pub async fn restore_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ProductResponse>, ApiError> {
    require_uuid(&id)?;

    let restored = sqlx::query_as::<_, Product>(
        "UPDATE products SET is_deleted = 0, deleted_at = NULL WHERE id = ? AND is_deleted = 1 RETURNING *",
    )
    .bind(&id)
    .fetch_optional(&state.db)
    .await?;

    match restored {
        Some(product) => {
            tracing::info!(product_id = %product.id, "Product restored");
            Ok(ApiResponse::ok(ProductResponse::from(product)).with_message("Product is restored"))
        }
        None => {
            // Distinguish a live product from a missing one
            find_product(&state, &id).await?;
            Err(ApiError::conflict("Product is not deleted"))
        }
    }
}
