use serde::{Deserialize, Serialize};

use exportmart_core::UserId;

use crate::Role;

/// Authenticated user as supplied by the identity provider.
///
/// Workflows copy the contact fields into their own snapshots (the buyer of an
/// RFQ, the supplier of a response) at the moment of the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            name: name.into(),
            email: email.into(),
            company: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
