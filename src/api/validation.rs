//! Input validation for API requests.
//!
//! Field validators return `Err(message)`; handlers collect them with the
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{Category, CreateProductRequest, Image, Review, UpdateProductRequest};

use super::error::{ApiError, ValidationErrorBuilder};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 30;
pub const MAX_PRODUCT_NAME_LEN: usize = 100;
pub const MAX_STOCK: i64 = 99_999;

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Please enter your email".to_string());
    }

    if email.len() > 254 || !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Please enter a valid email address".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Please enter your name".to_string());
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Your name cannot exceed {} characters", MAX_NAME_LEN));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Your password must be longer than {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate a UUID identifier
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {}", field_name));
    }

    Ok(())
}

/// Path id check shared by every `/:id` handler
pub fn require_uuid(id: &str) -> Result<(), ApiError> {
    validate_uuid(id, "ID").map_err(|e| ApiError::validation_field("id", e))
}

pub fn validate_image(image: &Image) -> Result<(), String> {
    if image.public_id.trim().is_empty() || image.url.trim().is_empty() {
        return Err("Images need both a public_id and a url".to_string());
    }
    Ok(())
}

pub fn validate_product_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Please enter product name".to_string());
    }

    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(format!(
            "Product name cannot exceed {} characters",
            MAX_PRODUCT_NAME_LEN
        ));
    }

    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a non-negative number".to_string());
    }
    Ok(())
}

pub fn validate_stock(stock: i64) -> Result<(), String> {
    if !(0..=MAX_STOCK).contains(&stock) {
        return Err(format!("Stock must be between 0 and {}", MAX_STOCK));
    }
    Ok(())
}

pub fn validate_rating(rating: f64) -> Result<(), String> {
    if !(0.0..=5.0).contains(&rating) {
        return Err("Rating must be between 0 and 5".to_string());
    }
    Ok(())
}

/// Parse a category name, listing the accepted values on failure
pub fn validate_category(category: &str) -> Result<Category, String> {
    category.parse::<Category>().map_err(|_| {
        let names: Vec<_> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("Please select a valid category: {}", names.join(", "))
    })
}

fn validate_reviews(reviews: &[Review]) -> Result<(), String> {
    for review in reviews {
        if review.name.trim().is_empty() {
            return Err("Every review needs a name".to_string());
        }
        validate_rating(review.rating)?;
    }
    Ok(())
}

/// Validate a new product
pub fn validate_create_product(req: &CreateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_product_name(&req.name) {
        errors.add("name", e);
    }

    if let Err(e) = validate_price(req.price) {
        errors.add("price", e);
    }

    if req.description.trim().is_empty() {
        errors.add("description", "Please enter product description");
    }

    if let Err(e) = validate_rating(req.ratings) {
        errors.add("ratings", e);
    }

    if let Err(e) = validate_category(&req.category) {
        errors.add("category", e);
    }

    if req.seller.trim().is_empty() {
        errors.add("seller", "Please enter product seller");
    }

    if let Err(e) = validate_stock(req.stock) {
        errors.add("stock", e);
    }

    if let Some(count) = req.num_of_reviews {
        if count < 0 {
            errors.add("numOfReviews", "Number of reviews cannot be negative");
        }
    }

    for image in &req.images {
        if let Err(e) = validate_image(image) {
            errors.add("images", e);
        }
    }

    if let Err(e) = validate_reviews(&req.reviews) {
        errors.add("reviews", e);
    }

    errors.finish()
}

/// Validate a product update (only validates provided fields)
pub fn validate_update_product(req: &UpdateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_product_name(name) {
            errors.add("name", e);
        }
    }

    if let Some(price) = req.price {
        if let Err(e) = validate_price(price) {
            errors.add("price", e);
        }
    }

    if let Some(ref description) = req.description {
        if description.trim().is_empty() {
            errors.add("description", "Please enter product description");
        }
    }

    if let Some(ratings) = req.ratings {
        if let Err(e) = validate_rating(ratings) {
            errors.add("ratings", e);
        }
    }

    if let Some(ref category) = req.category {
        if let Err(e) = validate_category(category) {
            errors.add("category", e);
        }
    }

    if let Some(ref seller) = req.seller {
        if seller.trim().is_empty() {
            errors.add("seller", "Please enter product seller");
        }
    }

    if let Some(stock) = req.stock {
        if let Err(e) = validate_stock(stock) {
            errors.add("stock", e);
        }
    }

    if let Some(count) = req.num_of_reviews {
        if count < 0 {
            errors.add("numOfReviews", "Number of reviews cannot be negative");
        }
    }

    if let Some(ref images) = req.images {
        for image in images {
            if let Err(e) = validate_image(image) {
                errors.add("images", e);
            }
        }
    }

    if let Some(ref reviews) = req.reviews {
        if let Err(e) = validate_reviews(reviews) {
            errors.add("reviews", e);
        }
    }

    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_product() -> CreateProductRequest {
        CreateProductRequest {
            name: "SanDisk Ultra 128GB".to_string(),
            price: 45.89,
            description: "Memory card".to_string(),
            ratings: 4.5,
            images: vec![Image::new("products/1", "https://cdn.example.com/1.jpg")],
            category: "Electronics".to_string(),
            seller: "Ebay".to_string(),
            stock: 50,
            num_of_reviews: None,
            reviews: vec![],
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@shop.co.uk").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Jane").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(31)).is_err());
        assert!(validate_name(&"x".repeat(30)).is_ok());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "ID").is_ok());
        assert!(validate_uuid("", "ID").is_err());
        assert_eq!(validate_uuid("not-a-uuid", "ID").unwrap_err(), "Invalid ID");
    }

    #[test]
    fn test_validate_category() {
        assert_eq!(validate_category("Laptops").unwrap(), Category::Laptops);
        let err = validate_category("Toys").unwrap_err();
        assert!(err.contains("Beauty/Health"));
    }

    #[test]
    fn test_valid_product_passes() {
        assert!(validate_create_product(&valid_product()).is_ok());
    }

    #[test]
    fn test_invalid_product_collects_every_field() {
        let mut req = valid_product();
        req.name = "x".repeat(101);
        req.price = -1.0;
        req.stock = 100_000;
        req.category = "Toys".to_string();

        let err = validate_create_product(&req).unwrap_err();
        assert!(err.message().contains("4 fields"));
    }

    #[test]
    fn test_update_validates_only_present_fields() {
        assert!(validate_update_product(&UpdateProductRequest::default()).is_ok());

        let req = UpdateProductRequest {
            ratings: Some(7.0),
            ..Default::default()
        };
        assert!(validate_update_product(&req).is_err());
    }
}
