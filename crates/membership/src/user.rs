use serde::{Deserialize, Serialize};

use exportmart_auth::Role;
use exportmart_core::{DomainError, UserId};

/// Review state of a supplier's membership application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Approved => "approved",
            MembershipStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MembershipStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MembershipStatus::Pending),
            "approved" => Ok(MembershipStatus::Approved),
            "rejected" => Ok(MembershipStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown membership status '{other}'"
            ))),
        }
    }
}

/// Subscription level of a supplier. Independent of the review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Starter,
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Starter => "starter",
            MembershipTier::Silver => "silver",
            MembershipTier::Gold => "gold",
            MembershipTier::Platinum => "platinum",
        }
    }

    pub fn is_premium(&self) -> bool {
        matches!(self, MembershipTier::Gold | MembershipTier::Platinum)
    }
}

impl core::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MembershipTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(MembershipTier::Starter),
            "silver" => Ok(MembershipTier::Silver),
            "gold" => Ok(MembershipTier::Gold),
            "platinum" => Ok(MembershipTier::Platinum),
            other => Err(DomainError::validation(format!(
                "unknown membership tier '{other}'"
            ))),
        }
    }
}

/// The slice of the identity layer's user record the gate needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub membership_status: Option<MembershipStatus>,
    #[serde(default)]
    pub membership_tier: Option<MembershipTier>,
}

impl User {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            membership_status: None,
            membership_tier: None,
        }
    }

    pub fn with_membership(mut self, status: MembershipStatus, tier: Option<MembershipTier>) -> Self {
        self.membership_status = Some(status);
        self.membership_tier = tier;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_display() {
        for status in [
            MembershipStatus::Pending,
            MembershipStatus::Approved,
            MembershipStatus::Rejected,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.to_string()));
            assert_eq!(status.as_str().parse::<MembershipStatus>().unwrap(), status);
        }

        let tier: MembershipTier = serde_json::from_str("\"platinum\"").unwrap();
        assert_eq!(tier, MembershipTier::Platinum);
        assert!(serde_json::from_str::<MembershipTier>("\"Gold\"").is_err());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "suspended".parse::<MembershipStatus>().unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("suspended") => {}
            _ => panic!("Expected Validation error"),
        }
    }
}
