//! Product-upload gating.
//!
//! - No IO
//! - No state of its own
//!
//! Only suppliers with an approved membership may upload products. Admins are
//! routed to their own tooling and do not pass this gate either.

use exportmart_auth::Role;

use crate::user::{MembershipStatus, User};

/// Why a user may not upload products.
///
/// `Display` is the message shown to that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDenial {
    NotLoggedIn,
    BuyerAccount,
    AdminAccount,
    MembershipPending,
    MembershipRejected,
    MembershipMissing,
}

impl core::fmt::Display for UploadDenial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            UploadDenial::NotLoggedIn => "Please log in to continue",
            UploadDenial::BuyerAccount => {
                "You need a supplier account to upload products. Please register as a supplier."
            }
            UploadDenial::AdminAccount => "Admin accounts manage products from the admin console",
            UploadDenial::MembershipPending => "Your membership application is pending approval",
            UploadDenial::MembershipRejected => {
                "Your membership application was rejected. Please contact support."
            }
            UploadDenial::MembershipMissing => {
                "Please complete your membership application to upload products"
            }
        };
        f.write_str(msg)
    }
}

/// `None` when the user may upload.
pub fn upload_denial_reason(user: Option<&User>) -> Option<UploadDenial> {
    let user = match user {
        Some(u) => u,
        None => return Some(UploadDenial::NotLoggedIn),
    };

    match user.role {
        Role::Buyer => Some(UploadDenial::BuyerAccount),
        Role::Admin => Some(UploadDenial::AdminAccount),
        Role::Supplier => match user.membership_status {
            Some(MembershipStatus::Approved) => None,
            Some(MembershipStatus::Pending) => Some(UploadDenial::MembershipPending),
            Some(MembershipStatus::Rejected) => Some(UploadDenial::MembershipRejected),
            None => Some(UploadDenial::MembershipMissing),
        },
    }
}

pub fn can_upload_products(user: Option<&User>) -> bool {
    upload_denial_reason(user).is_none()
}

/// Message for a supplier who cannot upload yet; `None` for everyone else.
pub fn membership_status_message(user: Option<&User>) -> Option<String> {
    let user = user?;
    if user.role != Role::Supplier {
        return None;
    }
    upload_denial_reason(Some(user)).map(|reason| reason.to_string())
}

/// Buyers and admins need no membership; suppliers need an approved one.
pub fn has_approved_membership(user: Option<&User>) -> bool {
    match user {
        None => false,
        Some(u) if u.role != Role::Supplier => true,
        Some(u) => u.membership_status == Some(MembershipStatus::Approved),
    }
}

pub fn has_premium_membership(user: Option<&User>) -> bool {
    user.and_then(|u| u.membership_tier)
        .is_some_and(|tier| tier.is_premium())
}
