//! Common types and utilities shared across models.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A hosted image reference (avatar or product picture)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    /// Identifier at the image host
    pub public_id: String,
    pub url: String,
}

impl Image {
    pub fn new(public_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            url: url.into(),
        }
    }

    /// Placeholder used for accounts registered without an avatar
    pub fn default_avatar() -> Self {
        Self::new("avatars/default", "/images/default_avatar.png")
    }
}

/// Helper to parse a JSON array column, falling back to empty on bad data
pub fn parse_json_list<T: DeserializeOwned>(json: &str) -> Vec<T> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Helper to serialize a list to a JSON column
pub fn serialize_json_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
