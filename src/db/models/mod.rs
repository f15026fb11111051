//! Database models split into domain-specific modules.

pub mod common;
pub mod product;
pub mod session;
pub mod user;

pub use common::*;
pub use product::*;
pub use session::*;
pub use user::*;
