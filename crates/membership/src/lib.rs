//! Supplier membership: the product-upload gate and the application review flow.
//!
//! The gate is a set of pure functions over the user record handed to us by the
//! identity layer. The application aggregate is what an admin approves or
//! rejects; its outcome is the status the gate reads.

pub mod application;
pub mod gate;
pub mod user;

pub use application::{
    ApplicationApproved, ApplicationId, ApplicationRecord, ApplicationRejected,
    ApplicationSubmitted, ApproveApplication, CompanyProfile, MembershipApplication,
    MembershipCommand, MembershipEvent, RejectApplication, SubmitApplication,
};
pub use gate::{
    UploadDenial, can_upload_products, has_approved_membership, has_premium_membership,
    membership_status_message, upload_denial_reason,
};
pub use user::{MembershipStatus, MembershipTier, User};
