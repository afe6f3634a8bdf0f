use serde::{Deserialize, Serialize};

use exportmart_catalog::CategoryId;
use exportmart_core::UserId;

use crate::model::{RfqRecord, RfqStatus};

/// Listing filter. Every set field must match (intersection, never union).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqFilter {
    #[serde(default)]
    pub status: Option<RfqStatus>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub buyer_id: Option<UserId>,
    /// RFQs this supplier may respond to: open, and not posted by the supplier.
    #[serde(default)]
    pub supplier_id: Option<UserId>,
}

impl RfqFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RfqStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_buyer(mut self, buyer_id: UserId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn eligible_for_supplier(mut self, supplier_id: UserId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.category_id.is_none()
            && self.buyer_id.is_none()
            && self.supplier_id.is_none()
    }

    pub fn matches(&self, rfq: &RfqRecord) -> bool {
        if self.status.is_some_and(|s| s != rfq.status) {
            return false;
        }
        if self
            .category_id
            .as_ref()
            .is_some_and(|c| *c != rfq.category.id)
        {
            return false;
        }
        if self.buyer_id.is_some_and(|b| b != rfq.buyer.id) {
            return false;
        }
        if let Some(supplier) = self.supplier_id {
            if !rfq.is_open() || rfq.buyer.id == supplier {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use exportmart_catalog::CategoryRef;

    use crate::model::{BuyerRef, RfqId};

    fn record(buyer: UserId, category: &str, status: RfqStatus) -> RfqRecord {
        let now = Utc::now();
        RfqRecord {
            id: RfqId::generate(),
            title: "Basmati rice".into(),
            description: "20 containers".into(),
            category: CategoryRef {
                id: CategoryId::new(category),
                name: category.into(),
                slug: category.into(),
            },
            quantity: None,
            budget: None,
            deadline: None,
            specifications: BTreeMap::new(),
            buyer: BuyerRef {
                id: buyer,
                name: "Buyer".into(),
                email: "buyer@example.com".into(),
                company: None,
            },
            status,
            responses: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RfqFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&record(UserId::new(), "food", RfqStatus::Cancelled)));
    }

    #[test]
    fn filters_intersect() {
        let buyer = UserId::new();
        let open_food = record(buyer, "food", RfqStatus::Open);
        let closed_food = record(buyer, "food", RfqStatus::Closed);
        let open_steel = record(buyer, "steel", RfqStatus::Open);

        let filter = RfqFilter::new()
            .with_status(RfqStatus::Open)
            .with_category(CategoryId::new("food"));

        assert!(filter.matches(&open_food));
        assert!(!filter.matches(&closed_food));
        assert!(!filter.matches(&open_steel));
    }

    #[test]
    fn supplier_sees_only_open_rfqs_from_other_users() {
        let supplier = UserId::new();
        let foreign_open = record(UserId::new(), "food", RfqStatus::Open);
        let foreign_awarded = record(UserId::new(), "food", RfqStatus::Awarded);
        let own_open = record(supplier, "food", RfqStatus::Open);

        let filter = RfqFilter::new().eligible_for_supplier(supplier);
        assert!(filter.matches(&foreign_open));
        assert!(!filter.matches(&foreign_awarded));
        assert!(!filter.matches(&own_open));

        // Combined with a non-open status the supplier filter yields nothing.
        let closed = filter.with_status(RfqStatus::Closed);
        assert!(!closed.matches(&record(UserId::new(), "food", RfqStatus::Closed)));
    }
}
