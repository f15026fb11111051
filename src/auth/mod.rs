//! Credentials, session tokens, password recovery, the single-session guard
//! and the role gate.

mod error;
pub mod gate;
pub mod password;
pub mod reset;
pub mod session;
pub mod token;

pub use error::AuthError;
pub use gate::authorize;
pub use password::PasswordHasher;
pub use reset::ResetToken;
pub use token::{Claims, TokenService};
