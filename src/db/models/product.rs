//! Catalog product models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::{parse_json_list, Image};

/// Closed set of catalog categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Cameras,
    Laptops,
    Accessories,
    Headphones,
    Food,
    Books,
    #[serde(rename = "Clothes/Shoes")]
    ClothesShoes,
    #[serde(rename = "Beauty/Health")]
    BeautyHealth,
    Sports,
    Outdoor,
    Home,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Electronics,
        Category::Cameras,
        Category::Laptops,
        Category::Accessories,
        Category::Headphones,
        Category::Food,
        Category::Books,
        Category::ClothesShoes,
        Category::BeautyHealth,
        Category::Sports,
        Category::Outdoor,
        Category::Home,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Cameras => "Cameras",
            Category::Laptops => "Laptops",
            Category::Accessories => "Accessories",
            Category::Headphones => "Headphones",
            Category::Food => "Food",
            Category::Books => "Books",
            Category::ClothesShoes => "Clothes/Shoes",
            Category::BeautyHealth => "Beauty/Health",
            Category::Sports => "Sports",
            Category::Outdoor => "Outdoor",
            Category::Home => "Home",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Folded form stored in `name_search` / `category_search`.
///
/// `to_lowercase` folds all of Unicode, unlike SQLite's ASCII-only `LIKE`.
pub fn search_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A customer review embedded in a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub name: String,
    pub rating: f64,
    pub comment: String,
}

/// Stored product row. `images` and `reviews` are JSON arrays stored as TEXT.
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub ratings: f64,
    pub images: String,
    pub category: String,
    pub seller: String,
    pub stock: i64,
    pub num_of_reviews: i64,
    pub reviews: String,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub ratings: f64,
    pub images: Vec<Image>,
    pub category: String,
    pub seller: String,
    pub stock: i64,
    pub num_of_reviews: i64,
    pub reviews: Vec<Review>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            images: parse_json_list(&p.images),
            reviews: parse_json_list(&p.reviews),
            id: p.id,
            name: p.name,
            price: p.price,
            description: p.description,
            ratings: p.ratings,
            category: p.category,
            seller: p.seller,
            stock: p.stock,
            num_of_reviews: p.num_of_reviews,
            is_deleted: p.is_deleted,
            deleted_at: p.deleted_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub price: f64,
    pub description: String,
    #[serde(default)]
    pub ratings: f64,
    #[serde(default)]
    pub images: Vec<Image>,
    pub category: String,
    pub seller: String,
    pub stock: i64,
    #[serde(default)]
    pub num_of_reviews: Option<i64>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub ratings: Option<f64>,
    pub images: Option<Vec<Image>>,
    pub category: Option<String>,
    pub seller: Option<String>,
    pub stock: Option<i64>,
    pub num_of_reviews: Option<i64>,
    pub reviews: Option<Vec<Review>>,
}

/// One page of the catalog listing
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub current_page: u32,
    pub total_pages: u32,
    /// Products matching the search and filters, across all pages
    pub products_count: i64,
    /// Products on this page
    pub products_length: usize,
    pub products: Vec<ProductResponse>,
}
