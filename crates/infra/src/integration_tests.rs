//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → RfqProjection → ReadModel → EventBus
//!
//! Verifies:
//! - Workflow operations produce the documented RFQ lifecycle
//! - Listing filters intersect and the read model matches a full rebuild
//! - Optimistic concurrency lets exactly one of two racing accepts commit
//! - Membership review outcomes drive the product-upload gate

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;

    use exportmart_auth::{Principal, Role};
    use exportmart_catalog::{Category, CategoryId, InMemoryCategoryCatalog};
    use exportmart_core::UserId;
    use exportmart_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use exportmart_membership::{
        ApplicationId, ApplicationRecord, CompanyProfile, MembershipStatus, MembershipTier, User,
        can_upload_products, membership_status_message,
    };
    use exportmart_rfq::{
        Money, ResponseStatus, RfqFilter, RfqForm, RfqId, RfqRecord, RfqStatus,
    };

    use crate::error::WorkflowError;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::membership::MembershipReviews;
    use crate::projections::{RFQ_AGGREGATE_TYPE, RfqProjection};
    use crate::read_model::{
        InMemoryReadStore, InMemoryRfqReadStore, Pagination, ReadModelError, RfqReadStore,
    };
    use crate::workflow::RfqWorkflow;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Workflow = RfqWorkflow<
        Arc<InMemoryEventStore>,
        Bus,
        Arc<InMemoryRfqReadStore>,
        Arc<InMemoryCategoryCatalog>,
    >;

    struct Harness {
        workflow: Workflow,
        store: Arc<InMemoryEventStore>,
        bus: Bus,
        read_store: Arc<InMemoryRfqReadStore>,
    }

    fn setup() -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let read_store = Arc::new(InMemoryRfqReadStore::new());
        let catalog = Arc::new(InMemoryCategoryCatalog::with_categories([
            Category::new("textiles-1", "Textiles", "textiles"),
            Category::new("spices-1", "Spices", "spices"),
        ]));
        let workflow = RfqWorkflow::new(store.clone(), bus.clone(), read_store.clone(), catalog);
        Harness {
            workflow,
            store,
            bus,
            read_store,
        }
    }

    fn buyer(name: &str) -> Principal {
        Principal::new(UserId::new(), Role::Buyer, name, format!("{}@example.com", name.to_lowercase()))
    }

    fn supplier(name: &str) -> Principal {
        Principal::new(UserId::new(), Role::Supplier, name, format!("{}@example.com", name.to_lowercase()))
            .with_company(format!("{name} Trading"))
    }

    fn usd(amount: i64) -> Money {
        Money::new(Decimal::new(amount, 0), "USD")
    }

    fn t_shirts() -> RfqForm {
        RfqForm::new("1000 Cotton T-Shirts", "Bulk order, need by Q3", "textiles-1")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle scenarios
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn rfq_award_lifecycle() {
        let h = setup();
        let b1 = buyer("B1");
        let s1 = supplier("S1");
        let s2 = supplier("S2");

        // 1) create
        let rfq = h.workflow.create(&b1, t_shirts()).unwrap();
        assert_eq!(rfq.status, RfqStatus::Open);
        assert!(rfq.responses.is_empty());
        assert_eq!(rfq.buyer.id, b1.user_id);

        // 2) respond
        let response = h
            .workflow
            .submit_response(rfq.id, &s1, usd(4800), None)
            .unwrap();
        let current = h.workflow.get(rfq.id).unwrap().unwrap();
        assert_eq!(current.status, RfqStatus::Open);
        assert_eq!(current.responses.len(), 1);
        assert_eq!(response.status, ResponseStatus::Pending);

        // 3) accept
        let accepted = h
            .workflow
            .update_response_status(rfq.id, response.id, ResponseStatus::Accepted)
            .unwrap();
        assert_eq!(accepted.status, ResponseStatus::Accepted);
        let current = h.workflow.get(rfq.id).unwrap().unwrap();
        assert_eq!(current.status, RfqStatus::Awarded);

        // 4) late response
        let err = h
            .workflow
            .submit_response(rfq.id, &s2, usd(4500), None)
            .unwrap_err();
        match err {
            WorkflowError::InvalidState(msg) if msg.contains("not open") => {}
            other => panic!("Expected InvalidState for a late response, got {other:?}"),
        }

        // Read model agrees with the stream.
        assert_eq!(h.read_store.get(&rfq.id).unwrap(), h.workflow.get(rfq.id).unwrap());
    }

    #[test]
    fn closed_rfq_refuses_responses() {
        let h = setup();
        let b1 = buyer("B1");
        let rfq = h.workflow.create(&b1, t_shirts()).unwrap();

        let closed = h.workflow.update_status(rfq.id, RfqStatus::Closed).unwrap();
        assert_eq!(closed.status, RfqStatus::Closed);
        assert!(closed.updated_at >= closed.created_at);

        let err = h
            .workflow
            .submit_response(rfq.id, &supplier("S1"), usd(100), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));

        let err = h.workflow.update_status(rfq.id, RfqStatus::Open).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn rejecting_keeps_the_rfq_open() {
        let h = setup();
        let rfq = h.workflow.create(&buyer("B1"), t_shirts()).unwrap();
        let r = h
            .workflow
            .submit_response(rfq.id, &supplier("S1"), usd(5000), Some("MOQ 500".into()))
            .unwrap();

        let rejected = h
            .workflow
            .update_response_status(rfq.id, r.id, ResponseStatus::Rejected)
            .unwrap();
        assert_eq!(rejected.status, ResponseStatus::Rejected);
        assert_eq!(h.workflow.get(rfq.id).unwrap().unwrap().status, RfqStatus::Open);

        let err = h
            .workflow
            .update_response_status(rfq.id, r.id, ResponseStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }

    #[test]
    fn not_found_messages_distinguish_rfq_and_response() {
        let h = setup();
        let rfq = h.workflow.create(&buyer("B1"), t_shirts()).unwrap();

        let err = h
            .workflow
            .update_response_status(rfq.id, exportmart_rfq::ResponseId::new(), ResponseStatus::Accepted)
            .unwrap_err();
        assert_eq!(err.to_string(), "Response not found");

        let err = h
            .workflow
            .update_response_status(RfqId::generate(), exportmart_rfq::ResponseId::new(), ResponseStatus::Accepted)
            .unwrap_err();
        assert_eq!(err.to_string(), "RFQ not found");
    }

    #[test]
    fn delete_policy() {
        let h = setup();
        let b1 = buyer("B1");

        let untouched = h.workflow.create(&b1, t_shirts()).unwrap();
        h.workflow.delete(untouched.id).unwrap();
        assert_eq!(h.workflow.get(untouched.id).unwrap(), None);
        assert_eq!(h.workflow.list(&RfqFilter::new()).unwrap().total, 0);

        let err = h.workflow.delete(untouched.id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        let engaged = h.workflow.create(&b1, t_shirts()).unwrap();
        h.workflow
            .submit_response(engaged.id, &supplier("S1"), usd(10), None)
            .unwrap();
        let err = h.workflow.delete(engaged.id).unwrap_err();
        match err {
            WorkflowError::InvalidState(msg) if msg.contains("has responses") => {}
            other => panic!("Expected InvalidState for deleting an engaged RFQ, got {other:?}"),
        }
        assert!(h.workflow.get(engaged.id).unwrap().is_some());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listing
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn filters_intersect() {
        let h = setup();
        let b1 = buyer("B1");
        let b2 = buyer("B2");
        let s1 = supplier("S1");

        let a = h.workflow.create(&b1, t_shirts()).unwrap();
        let b = h
            .workflow
            .create(&b1, RfqForm::new("Saffron", "5 kg grade 1", "spices-1"))
            .unwrap();
        let c = h
            .workflow
            .create(&b2, RfqForm::new("Denim", "Raw selvedge", "textiles-1"))
            .unwrap();
        h.workflow.update_status(c.id, RfqStatus::Cancelled).unwrap();

        let ids = |records: Vec<RfqRecord>| records.into_iter().map(|r| r.id).collect::<Vec<_>>();

        let by_buyer = h.workflow.list(&RfqFilter::new().with_buyer(b1.user_id)).unwrap();
        assert_eq!(by_buyer.total, 2);

        let textiles_open = h
            .workflow
            .list(
                &RfqFilter::new()
                    .with_category(CategoryId::new("textiles-1"))
                    .with_status(RfqStatus::Open),
            )
            .unwrap();
        assert_eq!(ids(textiles_open.rfqs), vec![a.id]);

        // Newest first.
        let all = h.workflow.list(&RfqFilter::new()).unwrap();
        assert_eq!(all.total, 3);
        let mut expected = vec![a.clone(), b.clone(), h.workflow.get(c.id).unwrap().unwrap()];
        expected.sort_by(RfqRecord::listing_order);
        assert_eq!(ids(all.rfqs), ids(expected));

        let eligible = h
            .workflow
            .list(&RfqFilter::new().eligible_for_supplier(s1.user_id))
            .unwrap();
        assert_eq!(eligible.total, 2);
        assert!(eligible.rfqs.iter().all(|r| r.status == RfqStatus::Open));

        let nothing = h
            .workflow
            .list(
                &RfqFilter::new()
                    .eligible_for_supplier(s1.user_id)
                    .with_status(RfqStatus::Cancelled),
            )
            .unwrap();
        assert_eq!(nothing.total, 0);
        assert!(nothing.rfqs.is_empty());
    }

    #[test]
    fn rebuild_matches_live_read_model() {
        let h = setup();
        let b1 = buyer("B1");
        let s1 = supplier("S1");

        let a = h.workflow.create(&b1, t_shirts()).unwrap();
        let r = h.workflow.submit_response(a.id, &s1, usd(4800), None).unwrap();
        h.workflow
            .update_response_status(a.id, r.id, ResponseStatus::Accepted)
            .unwrap();
        let gone = h.workflow.create(&b1, t_shirts()).unwrap();
        h.workflow.delete(gone.id).unwrap();
        h.workflow.create(&b1, t_shirts()).unwrap();

        let live = h.workflow.list(&RfqFilter::new()).unwrap();

        // A second projection fed from scratch must agree with the live one.
        let fresh = RfqProjection::new(InMemoryRfqReadStore::new());
        let envelopes: Vec<_> = h
            .store
            .load_all(RFQ_AGGREGATE_TYPE)
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect();
        fresh.rebuild_from_scratch(&envelopes).unwrap();
        assert_eq!(fresh.query(&RfqFilter::new(), None).unwrap(), live.rfqs);

        let replayed = h.workflow.rebuild_read_model().unwrap();
        assert_eq!(replayed, envelopes.len());
        assert_eq!(h.workflow.list(&RfqFilter::new()).unwrap(), live);
    }

    #[test]
    fn bus_subscribers_see_committed_events_in_order() {
        let h = setup();
        let sub = h.bus.subscribe();

        let rfq = h.workflow.create(&buyer("B1"), t_shirts()).unwrap();
        let r = h
            .workflow
            .submit_response(rfq.id, &supplier("S1"), usd(4800), None)
            .unwrap();
        h.workflow
            .update_response_status(rfq.id, r.id, ResponseStatus::Accepted)
            .unwrap();

        // Rejected commands publish nothing.
        let _ = h.workflow.update_status(rfq.id, RfqStatus::Closed).unwrap_err();

        let published = sub.drain();
        let types: Vec<&str> = published.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["rfq.created", "rfq.response_submitted", "rfq.response_accepted"]
        );
        let seqs: Vec<u64> = published.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(published.iter().all(|e| e.aggregate_id() == rfq.id.0));
    }

    #[test]
    fn bus_driven_projection_converges() {
        let h = setup();
        let downstream = Arc::new(RfqProjection::new(InMemoryRfqReadStore::new()));

        // Subscribe before any events are published.
        let sub = h.bus.subscribe();

        let rfq = h.workflow.create(&buyer("B1"), t_shirts()).unwrap();
        h.workflow
            .submit_response(rfq.id, &supplier("S1"), usd(10), None)
            .unwrap();
        h.workflow
            .submit_response(rfq.id, &supplier("S2"), usd(12), None)
            .unwrap();

        for envelope in sub.drain() {
            downstream.apply_envelope(&envelope).unwrap();
        }
        assert_eq!(downstream.get(&rfq.id).unwrap(), h.workflow.get(rfq.id).unwrap());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Concurrency
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn racing_accepts_award_exactly_once() {
        for _ in 0..20 {
            let h = setup();
            let rfq = h.workflow.create(&buyer("B1"), t_shirts()).unwrap();
            let r1 = h
                .workflow
                .submit_response(rfq.id, &supplier("S1"), usd(4800), None)
                .unwrap();
            let r2 = h
                .workflow
                .submit_response(rfq.id, &supplier("S2"), usd(4700), None)
                .unwrap();

            let barrier = Barrier::new(2);
            let results: Vec<Result<_, WorkflowError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = [r1.id, r2.id]
                    .into_iter()
                    .map(|response_id| {
                        let workflow = &h.workflow;
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            workflow.update_response_status(rfq.id, response_id, ResponseStatus::Accepted)
                        })
                    })
                    .collect();
                handles.into_iter().map(|t| t.join().unwrap()).collect()
            });

            let wins = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1, "exactly one accept must commit: {results:?}");
            for loser in results.iter().filter_map(|r| r.as_ref().err()) {
                assert!(
                    matches!(loser, WorkflowError::Conflict(_) | WorkflowError::InvalidState(_)),
                    "unexpected loser error: {loser:?}"
                );
            }

            let current = h.workflow.get(rfq.id).unwrap().unwrap();
            assert_eq!(current.status, RfqStatus::Awarded);
            let accepted = current
                .responses
                .iter()
                .filter(|r| r.status == ResponseStatus::Accepted)
                .count();
            assert_eq!(accepted, 1);
            assert_eq!(h.read_store.get(&rfq.id).unwrap(), Some(current));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read-model failures after commit
    // ─────────────────────────────────────────────────────────────────────────

    /// RFQ read store whose next `failures` upserts fail.
    #[derive(Debug, Default)]
    struct FlakyRfqReadStore {
        inner: InMemoryRfqReadStore,
        failures: AtomicUsize,
    }

    impl FlakyRfqReadStore {
        fn fail_next_upserts(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }
    }

    impl RfqReadStore for FlakyRfqReadStore {
        fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ReadModelError> {
            self.inner.get(id)
        }

        fn upsert(&self, record: RfqRecord) -> Result<(), ReadModelError> {
            let pending = self.failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.failures.store(pending - 1, Ordering::SeqCst);
                return Err(ReadModelError::Backend("connection reset".to_string()));
            }
            self.inner.upsert(record)
        }

        fn remove(&self, id: &RfqId) -> Result<(), ReadModelError> {
            self.inner.remove(id)
        }

        fn query(
            &self,
            filter: &RfqFilter,
            pagination: Option<Pagination>,
        ) -> Result<Vec<RfqRecord>, ReadModelError> {
            self.inner.query(filter, pagination)
        }

        fn count(&self, filter: &RfqFilter) -> Result<u64, ReadModelError> {
            self.inner.count(filter)
        }

        fn clear(&self) -> Result<(), ReadModelError> {
            self.inner.clear()
        }
    }

    #[test]
    fn committed_write_survives_read_model_failure() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let read_store = Arc::new(FlakyRfqReadStore::default());
        let catalog = Arc::new(InMemoryCategoryCatalog::with_categories([Category::new(
            "textiles-1",
            "Textiles",
            "textiles",
        )]));
        let workflow = RfqWorkflow::new(store.clone(), bus.clone(), read_store.clone(), catalog);
        let sub = bus.subscribe();

        let rfq = workflow.create(&buyer("B1"), t_shirts()).unwrap();
        read_store.fail_next_upserts(1);

        // The append committed, so the caller sees success and nobody retries.
        let response = workflow
            .submit_response(rfq.id, &supplier("S1"), usd(4800), None)
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Pending);
        assert_eq!(store.load_stream(rfq.id.0).unwrap().len(), 2);

        // Subscribers still hear about it.
        let types: Vec<String> = sub.drain().iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(types, vec!["rfq.created", "rfq.response_submitted"]);

        // The stored listing is behind until the next read heals it.
        assert!(read_store.inner.get(&rfq.id).unwrap().unwrap().responses.is_empty());

        let listed = workflow.list(&RfqFilter::new()).unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.rfqs[0].responses.len(), 1);
        assert_eq!(listed.rfqs[0].responses[0].id, response.id);

        let page = workflow.list_page(&RfqFilter::new(), Pagination::default()).unwrap();
        assert_eq!(page.items, listed.rfqs);
        assert_eq!(workflow.get(rfq.id).unwrap().unwrap().responses.len(), 1);
    }

    #[test]
    fn listing_fails_while_read_model_stays_broken() {
        let store = Arc::new(InMemoryEventStore::new());
        let read_store = Arc::new(FlakyRfqReadStore::default());
        let catalog = Arc::new(InMemoryCategoryCatalog::with_categories([Category::new(
            "textiles-1",
            "Textiles",
            "textiles",
        )]));
        let workflow = RfqWorkflow::new(
            store,
            Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
            read_store.clone(),
            catalog,
        );

        read_store.fail_next_upserts(2);
        let rfq = workflow.create(&buyer("B1"), t_shirts()).unwrap();

        // First heal attempt hits the second failure; the stream stays stale.
        let err = workflow.list(&RfqFilter::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::ReadModel(_)));

        let listed = workflow.list(&RfqFilter::new()).unwrap();
        assert_eq!(listed.rfqs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![rfq.id]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn membership_review_drives_upload_gate() {
        let reviews = MembershipReviews::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
            InMemoryReadStore::<ApplicationId, ApplicationRecord>::new(),
        );
        let admin = Principal::new(UserId::new(), Role::Admin, "Root", "root@example.com");
        let applicant = supplier("S1");

        let user = User::new(applicant.user_id, Role::Supplier);
        assert!(!can_upload_products(Some(&user)));
        assert!(membership_status_message(Some(&user)).is_some());

        let application = reviews
            .submit(
                &applicant,
                MembershipTier::Silver,
                CompanyProfile::new("S1 Trading", "sales@s1.example"),
            )
            .unwrap();
        let user = reviews.apply_to(user).unwrap();
        assert_eq!(user.membership_status, Some(MembershipStatus::Pending));
        assert!(!can_upload_products(Some(&user)));

        reviews.approve(application.id, admin.user_id).unwrap();
        let user = reviews.apply_to(user).unwrap();
        assert_eq!(user.membership_status, Some(MembershipStatus::Approved));
        assert!(can_upload_products(Some(&user)));
        assert_eq!(membership_status_message(Some(&user)), None);
    }
}
