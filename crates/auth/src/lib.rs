//! `exportmart-auth`: identity snapshot and role checks.
//!
//! Authentication itself happens upstream: an external identity provider
//! hands us a user id, a role and contact details. This crate only models that
//! snapshot and the pure checks callers run before invoking a workflow.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, require_owner_or_admin, require_role};
pub use principal::Principal;
pub use roles::Role;
