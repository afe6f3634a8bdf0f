use thiserror::Error;

use exportmart_core::{DomainError, UserId};

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' may not {action}")]
    RoleNotAllowed { role: Role, action: &'static str },

    #[error("forbidden: only the owner or an admin may {action}")]
    NotOwner { action: &'static str },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Require the principal to hold one of `allowed`.
///
/// - No IO
/// - No business logic (pure policy check)
pub fn require_role(
    principal: &Principal,
    allowed: &[Role],
    action: &'static str,
) -> Result<(), AuthzError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(AuthzError::RoleNotAllowed {
            role: principal.role,
            action,
        })
    }
}

/// Require the principal to be an admin or the owning user.
pub fn require_owner_or_admin(
    principal: &Principal,
    owner: UserId,
    action: &'static str,
) -> Result<(), AuthzError> {
    if principal.is_admin() || principal.user_id == owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner { action })
    }
}
