use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the verified user id, injected by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the verified role, injected by the upstream gateway.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Actor role. Sellers and admins widen permissions; sellers still buy
/// like ordinary users.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Seller,
    Admin,
}

/// Identity of the caller, resolved once per request. Authentication itself
/// is terminated upstream; this service trusts the forwarded headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }

    /// True when the actor is the given owner, or an admin.
    pub fn owns_or_admin(&self, owner: Uuid) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError(format!("missing {} header", USER_ID_HEADER)))?;

        let user_id = Uuid::parse_str(raw_id).map_err(|_| {
            ServiceError::AuthError(format!("malformed {} header", USER_ID_HEADER))
        })?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    ServiceError::AuthError(format!("malformed {} header", USER_ROLE_HEADER))
                })?;
                raw.parse::<Role>()
                    .map_err(|_| ServiceError::AuthError(format!("unknown role '{}'", raw)))?
            }
            None => Role::User,
        };

        Ok(AuthContext { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("seller".parse::<Role>().unwrap(), Role::Seller);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn owns_or_admin_checks() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let ctx = AuthContext::new(owner, Role::User);
        assert!(ctx.owns_or_admin(owner));
        assert!(!ctx.owns_or_admin(stranger));

        let admin = AuthContext::new(Uuid::new_v4(), Role::Admin);
        assert!(admin.owns_or_admin(stranger));
    }
}
