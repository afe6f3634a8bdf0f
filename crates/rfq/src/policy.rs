//! Who may do what to an RFQ.
//!
//! The workflow does not call this; the caller layer (an HTTP handler, an
//! admin tool) checks the acting principal before dispatching.

use exportmart_auth::{Principal, Role, require_owner_or_admin, require_role};
use exportmart_core::{DomainError, DomainResult};

use crate::model::RfqRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfqAction {
    Create,
    Respond,
    DecideResponse,
    ChangeStatus,
    Delete,
}

impl RfqAction {
    fn describe(&self) -> &'static str {
        match self {
            RfqAction::Create => "create an RFQ",
            RfqAction::Respond => "respond to an RFQ",
            RfqAction::DecideResponse => "decide on a response",
            RfqAction::ChangeStatus => "change the RFQ status",
            RfqAction::Delete => "delete the RFQ",
        }
    }
}

/// Pure policy check.
///
/// `rfq` is the target record; it is ignored for `Create` and required for
/// every other action.
pub fn authorize(principal: &Principal, action: RfqAction, rfq: Option<&RfqRecord>) -> DomainResult<()> {
    let what = action.describe();

    if action == RfqAction::Create {
        require_role(principal, &[Role::Buyer, Role::Admin], what)?;
        return Ok(());
    }

    let rfq = rfq.ok_or_else(|| DomainError::not_found("RFQ"))?;

    match action {
        RfqAction::Create => Ok(()),
        RfqAction::Respond => {
            require_role(principal, &[Role::Supplier, Role::Admin], what)?;
            if rfq.buyer.id == principal.user_id {
                return Err(DomainError::unauthorized(
                    "suppliers cannot respond to their own RFQ",
                ));
            }
            Ok(())
        }
        RfqAction::DecideResponse | RfqAction::ChangeStatus | RfqAction::Delete => {
            require_owner_or_admin(principal, rfq.buyer.id, what)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use exportmart_catalog::{CategoryId, CategoryRef};
    use exportmart_core::UserId;

    use crate::model::{BuyerRef, RfqId, RfqStatus};

    fn principal(role: Role) -> Principal {
        Principal::new(UserId::new(), role, "Sam", "sam@example.com")
    }

    fn rfq_owned_by(buyer: &Principal) -> RfqRecord {
        let now = Utc::now();
        RfqRecord {
            id: RfqId::generate(),
            title: "Copper wire".into(),
            description: "5 tonnes".into(),
            category: CategoryRef {
                id: CategoryId::new("metals"),
                name: "Metals".into(),
                slug: "metals".into(),
            },
            quantity: None,
            budget: None,
            deadline: None,
            specifications: BTreeMap::new(),
            buyer: BuyerRef::from(buyer),
            status: RfqStatus::Open,
            responses: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_buyers_and_admins_create() {
        assert!(authorize(&principal(Role::Buyer), RfqAction::Create, None).is_ok());
        assert!(authorize(&principal(Role::Admin), RfqAction::Create, None).is_ok());

        let err = authorize(&principal(Role::Supplier), RfqAction::Create, None).unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn buyers_cannot_respond() {
        let owner = principal(Role::Buyer);
        let rfq = rfq_owned_by(&owner);

        assert!(authorize(&principal(Role::Supplier), RfqAction::Respond, Some(&rfq)).is_ok());
        assert!(authorize(&principal(Role::Buyer), RfqAction::Respond, Some(&rfq)).is_err());
    }

    #[test]
    fn supplier_cannot_respond_to_own_rfq() {
        let supplier = principal(Role::Supplier);
        let rfq = rfq_owned_by(&supplier);

        let err = authorize(&supplier, RfqAction::Respond, Some(&rfq)).unwrap_err();
        match err {
            DomainError::Unauthorized(msg) if msg.contains("own RFQ") => {}
            _ => panic!("Expected unauthorized error"),
        }
    }

    #[test]
    fn decisions_belong_to_owner_or_admin() {
        let owner = principal(Role::Buyer);
        let rfq = rfq_owned_by(&owner);

        for action in [RfqAction::DecideResponse, RfqAction::ChangeStatus, RfqAction::Delete] {
            assert!(authorize(&owner, action, Some(&rfq)).is_ok());
            assert!(authorize(&principal(Role::Admin), action, Some(&rfq)).is_ok());
            assert!(authorize(&principal(Role::Buyer), action, Some(&rfq)).is_err());
            assert!(authorize(&principal(Role::Supplier), action, Some(&rfq)).is_err());
        }
    }

    #[test]
    fn missing_target_is_not_found() {
        let err = authorize(&principal(Role::Admin), RfqAction::Delete, None).unwrap_err();
        assert_eq!(err, DomainError::not_found("RFQ"));
    }
}
