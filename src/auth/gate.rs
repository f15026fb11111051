use super::AuthError;
use crate::db::{Role, User};

/// Allow the principal through only if their role is one of `allowed`.
pub fn authorize(user: &User, allowed: &[Role], resource: &str) -> Result<(), AuthError> {
    let role = user.role_enum();
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            role,
            resource: resource.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: &str) -> User {
        User {
            id: "u1".to_string(),
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            avatar_public_id: None,
            avatar_url: None,
            reset_password_token: None,
            reset_password_expire: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_admin_passes_admin_gate() {
        assert!(authorize(&user_with_role("admin"), &[Role::Admin], "/api/v1/admin/users").is_ok());
    }

    #[test]
    fn test_user_is_forbidden_with_message() {
        let err = authorize(&user_with_role("user"), &[Role::Admin], "/api/v1/admin/users")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Role (user) is not allowed to access this resource: /api/v1/admin/users"
        );
    }

    #[test]
    fn test_unknown_role_is_treated_as_user() {
        assert!(authorize(&user_with_role("root"), &[Role::Admin], "x").is_err());
        assert!(authorize(&user_with_role("root"), &[Role::User, Role::Admin], "x").is_ok());
    }
}
