//! Login session model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub is_active: bool,
    pub created_at: String,
    pub expires_at: String,
}

impl Session {
    /// Active and not yet past its token expiry (`now` in stored timestamp form)
    pub fn is_live(&self, now: &str) -> bool {
        self.is_active && self.expires_at.as_str() > now
    }
}
