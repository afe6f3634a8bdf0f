use std::sync::Arc;

use exportmart_rfq::{RfqFilter, RfqId, RfqRecord};

use super::store::{InMemoryReadStore, ReadStore};
use super::{Pagination, ReadModelError};

/// Queryable RFQ read model.
///
/// Results come back in listing order (newest first, ties by id). Filters
/// narrow before pagination, so `count` and `query` agree on the same set.
pub trait RfqReadStore: Send + Sync {
    fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ReadModelError>;
    fn upsert(&self, record: RfqRecord) -> Result<(), ReadModelError>;
    fn remove(&self, id: &RfqId) -> Result<(), ReadModelError>;
    fn query(
        &self,
        filter: &RfqFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<RfqRecord>, ReadModelError>;
    fn count(&self, filter: &RfqFilter) -> Result<u64, ReadModelError>;
    fn clear(&self) -> Result<(), ReadModelError>;

    /// One page of matches plus the total match count.
    ///
    /// The default issues `count` and `query` as two reads, so a write landing
    /// between them can make the total disagree with the items. Stores that can
    /// answer both from one snapshot override it.
    fn page(
        &self,
        filter: &RfqFilter,
        pagination: Pagination,
    ) -> Result<(Vec<RfqRecord>, u64), ReadModelError> {
        let total = self.count(filter)?;
        let items = self.query(filter, Some(pagination))?;
        Ok((items, total))
    }
}

impl<S> RfqReadStore for Arc<S>
where
    S: RfqReadStore + ?Sized,
{
    fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ReadModelError> {
        (**self).get(id)
    }

    fn upsert(&self, record: RfqRecord) -> Result<(), ReadModelError> {
        (**self).upsert(record)
    }

    fn remove(&self, id: &RfqId) -> Result<(), ReadModelError> {
        (**self).remove(id)
    }

    fn query(
        &self,
        filter: &RfqFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<RfqRecord>, ReadModelError> {
        (**self).query(filter, pagination)
    }

    fn count(&self, filter: &RfqFilter) -> Result<u64, ReadModelError> {
        (**self).count(filter)
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        (**self).clear()
    }

    fn page(
        &self,
        filter: &RfqFilter,
        pagination: Pagination,
    ) -> Result<(Vec<RfqRecord>, u64), ReadModelError> {
        (**self).page(filter, pagination)
    }
}

/// In-memory RFQ read model; filters and sorts on every query.
#[derive(Debug, Default)]
pub struct InMemoryRfqReadStore {
    records: InMemoryReadStore<RfqId, RfqRecord>,
}

impl InMemoryRfqReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, filter: &RfqFilter) -> Result<Vec<RfqRecord>, ReadModelError> {
        let mut out: Vec<RfqRecord> = self
            .records
            .list()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        out.sort_by(RfqRecord::listing_order);
        Ok(out)
    }
}

impl RfqReadStore for InMemoryRfqReadStore {
    fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ReadModelError> {
        self.records.get(id)
    }

    fn upsert(&self, record: RfqRecord) -> Result<(), ReadModelError> {
        self.records.upsert(record.id, record)
    }

    fn remove(&self, id: &RfqId) -> Result<(), ReadModelError> {
        self.records.remove(id)
    }

    fn query(
        &self,
        filter: &RfqFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<RfqRecord>, ReadModelError> {
        let all = self.matching(filter)?;
        Ok(match pagination {
            Some(p) => p.slice(all),
            None => all,
        })
    }

    fn count(&self, filter: &RfqFilter) -> Result<u64, ReadModelError> {
        Ok(self.matching(filter)?.len() as u64)
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        self.records.clear()
    }

    fn page(
        &self,
        filter: &RfqFilter,
        pagination: Pagination,
    ) -> Result<(Vec<RfqRecord>, u64), ReadModelError> {
        let all = self.matching(filter)?;
        let total = all.len() as u64;
        Ok((pagination.slice(all), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use exportmart_catalog::{CategoryId, CategoryRef};
    use exportmart_core::UserId;
    use exportmart_rfq::{BuyerRef, RfqStatus};

    fn record(buyer: UserId, category: &str, status: RfqStatus, age_minutes: i64) -> RfqRecord {
        let at = Utc::now() - Duration::minutes(age_minutes);
        RfqRecord {
            id: RfqId::generate(),
            title: format!("{category} order"),
            description: "bulk".to_string(),
            category: CategoryRef {
                id: CategoryId::new(category),
                name: category.to_string(),
                slug: category.to_string(),
            },
            quantity: None,
            budget: None,
            deadline: None,
            specifications: BTreeMap::new(),
            buyer: BuyerRef {
                id: buyer,
                name: "Buyer".to_string(),
                email: "buyer@example.com".to_string(),
                company: None,
            },
            status,
            responses: vec![],
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn query_is_newest_first_and_paginated() {
        let store = InMemoryRfqReadStore::new();
        let buyer = UserId::new();
        let oldest = record(buyer, "textiles", RfqStatus::Open, 30);
        let middle = record(buyer, "textiles", RfqStatus::Open, 20);
        let newest = record(buyer, "textiles", RfqStatus::Open, 10);
        for r in [&middle, &oldest, &newest] {
            store.upsert(r.clone()).unwrap();
        }

        let all = store.query(&RfqFilter::new(), None).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        let second = store
            .query(&RfqFilter::new(), Some(Pagination::new(2, 2)))
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, oldest.id);
        assert_eq!(store.count(&RfqFilter::new()).unwrap(), 3);
    }

    #[test]
    fn page_reports_total_with_items() {
        let store = InMemoryRfqReadStore::new();
        let buyer = UserId::new();
        for age in 1..=5 {
            store.upsert(record(buyer, "spices", RfqStatus::Open, age)).unwrap();
        }
        store.upsert(record(buyer, "spices", RfqStatus::Closed, 6)).unwrap();

        let open = RfqFilter::new().with_status(RfqStatus::Open);
        let (items, total) = store.page(&open, Pagination::new(2, 2)).unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);

        let (items, total) = store.page(&open, Pagination::new(9, 2)).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 5);
    }

    #[test]
    fn supplier_filter_hides_own_and_closed_rfqs() {
        let store = InMemoryRfqReadStore::new();
        let supplier = UserId::new();
        let other_buyer = UserId::new();

        let own = record(supplier, "metals", RfqStatus::Open, 1);
        let closed = record(other_buyer, "metals", RfqStatus::Closed, 2);
        let eligible = record(other_buyer, "metals", RfqStatus::Open, 3);
        for r in [&own, &closed, &eligible] {
            store.upsert(r.clone()).unwrap();
        }

        let filter = RfqFilter::new().eligible_for_supplier(supplier);
        let found = store.query(&filter, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, eligible.id);
        assert_eq!(store.count(&filter).unwrap(), 1);
    }
}
