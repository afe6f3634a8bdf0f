//! RFQ workflow service.
//!
//! Each write is one command against one RFQ stream:
//!
//! ```text
//! execute (load → rehydrate → decide → append Exact(version))
//!   ↓
//! catch up the RFQ read model
//!   ↓
//! publish the committed envelopes
//! ```
//!
//! The append is the only serialization point. Two writers deciding against
//! the same version cannot both commit; the loser gets `WorkflowError::Conflict`
//! and nothing is retried here.
//!
//! Once the append succeeds the command has succeeded. A failed read-model
//! update or publish after that point is logged, and the stream is caught up
//! again before the next listing.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use exportmart_catalog::CategoryLookup;
use exportmart_core::AggregateId;
use exportmart_events::{EventBus, EventEnvelope};
use exportmart_rfq::{
    BuyerRef, ChangeStatus, CreateRfq, DecideResponse, DeleteRfq, Money, ResponseDecision,
    ResponseId, ResponseStatus, Rfq, RfqCommand, RfqFilter, RfqForm, RfqId, RfqRecord,
    RfqResponse, RfqStatus, SubmitResponse, SupplierRef,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::WorkflowError;
use crate::event_store::EventStore;
use crate::projections::{RFQ_AGGREGATE_TYPE, RfqProjection, StaleStreams};
use crate::read_model::page::DEFAULT_PAGE_SIZE;
use crate::read_model::{Page, Pagination, RfqReadStore};

/// Result of an unpaginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqList {
    pub rfqs: Vec<RfqRecord>,
    pub total: u64,
}

fn make_rfq(id: AggregateId) -> Rfq {
    Rfq::empty(RfqId::new(id))
}

fn command_name(command: &RfqCommand) -> &'static str {
    match command {
        RfqCommand::CreateRfq(_) => "create_rfq",
        RfqCommand::SubmitResponse(_) => "submit_response",
        RfqCommand::DecideResponse(_) => "decide_response",
        RfqCommand::ChangeStatus(_) => "change_status",
        RfqCommand::DeleteRfq(_) => "delete_rfq",
    }
}

#[derive(Debug)]
pub struct RfqWorkflow<S, B, R, C>
where
    R: RfqReadStore,
{
    dispatcher: CommandDispatcher<S, B>,
    projection: RfqProjection<R>,
    stale: StaleStreams,
    categories: C,
    default_page_size: u32,
}

impl<S, B, R, C> RfqWorkflow<S, B, R, C>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: RfqReadStore,
    C: CategoryLookup,
{
    pub fn new(store: S, bus: B, read_store: R, categories: C) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projection: RfqProjection::new(read_store),
            stale: StaleStreams::new(),
            categories,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = Pagination::first(page_size).page_size;
        self
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn projection(&self) -> &RfqProjection<R> {
        &self.projection
    }

    /// Page `page` at the configured default size.
    pub fn pagination(&self, page: u32) -> Pagination {
        Pagination::new(page, self.default_page_size)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Create an open RFQ with no responses.
    ///
    /// The category is resolved first; an unknown id fails before anything
    /// is written.
    pub fn create(&self, buyer: impl Into<BuyerRef>, form: RfqForm) -> Result<RfqRecord, WorkflowError> {
        let category = self
            .categories
            .resolve_category(&form.category_id)
            .ok_or_else(|| {
                warn!(category_id = %form.category_id, "rfq create rejected: unknown category");
                WorkflowError::Validation(format!("unknown category: {}", form.category_id))
            })?;

        let rfq_id = RfqId::generate();
        let command = RfqCommand::CreateRfq(CreateRfq {
            rfq_id,
            buyer: buyer.into(),
            title: form.title,
            description: form.description,
            category,
            quantity: form.quantity,
            budget: form.budget,
            deadline: form.deadline,
            specifications: form.specifications,
            occurred_at: Utc::now(),
        });

        self.commit(rfq_id, command)?
            .into_record()
            .ok_or_else(|| WorkflowError::not_found("RFQ"))
    }

    /// Add a pending response to an open RFQ.
    pub fn submit_response(
        &self,
        rfq_id: RfqId,
        supplier: impl Into<SupplierRef>,
        price: Money,
        message: Option<String>,
    ) -> Result<RfqResponse, WorkflowError> {
        let response_id = ResponseId::new();
        let command = RfqCommand::SubmitResponse(SubmitResponse {
            rfq_id,
            response_id,
            supplier: supplier.into(),
            price,
            message,
            occurred_at: Utc::now(),
        });

        let rfq = self.commit(rfq_id, command)?;
        committed_response(&rfq, &response_id)
    }

    /// Accept or reject a pending response.
    ///
    /// Accepting also awards the RFQ, in the same append.
    pub fn update_response_status(
        &self,
        rfq_id: RfqId,
        response_id: ResponseId,
        status: ResponseStatus,
    ) -> Result<RfqResponse, WorkflowError> {
        let decision = ResponseDecision::try_from(status)?;
        let command = RfqCommand::DecideResponse(DecideResponse {
            rfq_id,
            response_id,
            decision,
            occurred_at: Utc::now(),
        });

        let rfq = self.commit(rfq_id, command)?;
        committed_response(&rfq, &response_id)
    }

    /// Close or cancel an open RFQ. Responses are left as they are.
    pub fn update_status(&self, rfq_id: RfqId, status: RfqStatus) -> Result<RfqRecord, WorkflowError> {
        let command = RfqCommand::ChangeStatus(ChangeStatus {
            rfq_id,
            status,
            occurred_at: Utc::now(),
        });

        self.commit(rfq_id, command)?
            .into_record()
            .ok_or_else(|| WorkflowError::not_found("RFQ"))
    }

    /// Delete an RFQ that has no responses. Its id is not reusable afterwards.
    pub fn delete(&self, rfq_id: RfqId) -> Result<(), WorkflowError> {
        let command = RfqCommand::DeleteRfq(DeleteRfq {
            rfq_id,
            occurred_at: Utc::now(),
        });
        self.commit(rfq_id, command)?;
        Ok(())
    }

    fn commit(&self, rfq_id: RfqId, command: RfqCommand) -> Result<Rfq, WorkflowError> {
        let name = command_name(&command);

        let out = match self
            .dispatcher
            .execute(rfq_id.0, RFQ_AGGREGATE_TYPE, command, make_rfq)
        {
            Ok(out) => out,
            Err(err) if err.is_conflict() => {
                warn!(rfq_id = %rfq_id, command = name, error = %err, "rfq command conflicted");
                return Err(err);
            }
            Err(err) => {
                warn!(rfq_id = %rfq_id, command = name, error = %err, "rfq command rejected");
                return Err(err);
            }
        };

        if let Err(err) = self.projection.catch_up(self.dispatcher.store(), rfq_id.0) {
            warn!(rfq_id = %rfq_id, error = %err, "rfq read model update failed; retrying on next read");
            self.stale.mark(rfq_id.0);
        }
        if let Err(err) = self.dispatcher.publish(&out.committed) {
            warn!(rfq_id = %rfq_id, error = %err, "publishing committed rfq events failed");
        }

        for stored in &out.committed {
            info!(
                rfq_id = %rfq_id,
                event_type = %stored.event_type,
                version = stored.sequence_number,
                "rfq event committed"
            );
        }
        Ok(out.state)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Current state rebuilt from the RFQ's stream; `None` if it never
    /// existed or was deleted.
    pub fn get(&self, rfq_id: RfqId) -> Result<Option<RfqRecord>, WorkflowError> {
        let rfq = self.dispatcher.load(rfq_id.0, make_rfq)?;
        debug!(rfq_id = %rfq_id, version = rfq_version(&rfq), "rfq loaded");
        Ok(rfq.into_record())
    }

    /// Retry read-model updates that failed after their events committed.
    fn heal_read_model(&self) -> Result<(), WorkflowError> {
        if self.stale.is_empty() {
            return Ok(());
        }
        self.stale
            .heal(|id| self.projection.catch_up(self.dispatcher.store(), id))?;
        Ok(())
    }

    /// Every matching RFQ, newest first.
    pub fn list(&self, filter: &RfqFilter) -> Result<RfqList, WorkflowError> {
        self.heal_read_model()?;
        let rfqs = self.projection.query(filter, None)?;
        let total = rfqs.len() as u64;
        Ok(RfqList { rfqs, total })
    }

    /// One page of matches. Whether `total` and `items` come from a single
    /// read depends on the store; see `RfqReadStore::page`.
    pub fn list_page(&self, filter: &RfqFilter, pagination: Pagination) -> Result<Page<RfqRecord>, WorkflowError> {
        self.heal_read_model()?;
        let (items, total) = self.projection.page(filter, pagination)?;
        Ok(Page::new(items, total, pagination))
    }

    /// Drop the RFQ read model and replay every RFQ stream into it.
    ///
    /// Returns the number of events replayed.
    pub fn rebuild_read_model(&self) -> Result<usize, WorkflowError> {
        let envelopes: Vec<EventEnvelope<JsonValue>> = self
            .dispatcher
            .store()
            .load_all(RFQ_AGGREGATE_TYPE)?
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        self.projection.rebuild_from_scratch(&envelopes)?;
        info!(events = envelopes.len(), "rfq read model rebuilt");
        Ok(envelopes.len())
    }
}

fn rfq_version(rfq: &Rfq) -> u64 {
    use exportmart_core::AggregateRoot;
    rfq.version()
}

fn committed_response(rfq: &Rfq, response_id: &ResponseId) -> Result<RfqResponse, WorkflowError> {
    rfq.record()
        .and_then(|r| r.response(response_id))
        .cloned()
        .ok_or_else(|| WorkflowError::not_found("Response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use exportmart_auth::{Principal, Role};
    use exportmart_catalog::{Category, InMemoryCategoryCatalog};
    use exportmart_core::UserId;
    use exportmart_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::read_model::InMemoryRfqReadStore;

    type TestWorkflow = RfqWorkflow<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
        InMemoryRfqReadStore,
        Arc<InMemoryCategoryCatalog>,
    >;

    fn workflow() -> (TestWorkflow, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = Arc::new(InMemoryCategoryCatalog::with_categories([Category::new(
            "textiles", "Textiles", "textiles",
        )]));
        let wf = RfqWorkflow::new(
            store.clone(),
            Arc::new(InMemoryEventBus::new()),
            InMemoryRfqReadStore::new(),
            catalog,
        );
        (wf, store)
    }

    fn buyer() -> Principal {
        Principal::new(UserId::new(), Role::Buyer, "Ada", "ada@example.com")
    }

    fn supplier() -> Principal {
        Principal::new(UserId::new(), Role::Supplier, "Lin", "lin@example.com").with_company("Lin Mills")
    }

    fn usd(amount: i64) -> Money {
        Money::new(Decimal::new(amount, 0), "usd")
    }

    #[test]
    fn create_snapshots_category_and_starts_open() {
        let (wf, _) = workflow();
        let rfq = wf
            .create(&buyer(), RfqForm::new("  Cotton yarn ", "Combed, 30s", "textiles"))
            .unwrap();

        assert_eq!(rfq.title, "Cotton yarn");
        assert_eq!(rfq.category.name, "Textiles");
        assert_eq!(rfq.status, RfqStatus::Open);
        assert!(rfq.responses.is_empty());
        assert_eq!(rfq.created_at, rfq.updated_at);
        assert_eq!(wf.get(rfq.id).unwrap(), Some(rfq));
    }

    #[test]
    fn unknown_category_writes_nothing() {
        let (wf, store) = workflow();
        let err = wf
            .create(&buyer(), RfqForm::new("Steel coil", "Cold rolled", "metals"))
            .unwrap_err();

        match err {
            WorkflowError::Validation(msg) if msg.contains("unknown category: metals") => {}
            other => panic!("Expected unknown category validation error, got {other:?}"),
        }
        assert!(store.load_all(RFQ_AGGREGATE_TYPE).unwrap().is_empty());
        assert_eq!(wf.list(&RfqFilter::new()).unwrap().total, 0);
    }

    #[test]
    fn submitted_response_normalizes_price() {
        let (wf, _) = workflow();
        let rfq = wf.create(&buyer(), RfqForm::new("Yarn", "Bulk", "textiles")).unwrap();

        let response = wf
            .submit_response(rfq.id, &supplier(), usd(1200), Some("FOB Karachi".into()))
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Pending);
        assert_eq!(response.price.currency, "USD");
        assert_eq!(response.supplier.company, "Lin Mills");
        assert_eq!(response.rfq_id, rfq.id);
    }

    #[test]
    fn pending_is_not_a_decision() {
        let (wf, _) = workflow();
        let rfq = wf.create(&buyer(), RfqForm::new("Yarn", "Bulk", "textiles")).unwrap();
        let response = wf.submit_response(rfq.id, &supplier(), usd(10), None).unwrap();

        let err = wf
            .update_response_status(rfq.id, response.id, ResponseStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn missing_rfq_reads_as_none_and_writes_as_not_found() {
        let (wf, _) = workflow();
        let missing = RfqId::generate();

        assert_eq!(wf.get(missing).unwrap(), None);
        let err = wf.update_status(missing, RfqStatus::Closed).unwrap_err();
        assert_eq!(err.to_string(), "RFQ not found");
    }

    #[test]
    fn list_page_reports_totals() {
        let (wf, _) = workflow();
        for i in 0..5 {
            wf.create(&buyer(), RfqForm::new(format!("RFQ {i}"), "Bulk", "textiles"))
                .unwrap();
        }

        let page = wf.list_page(&RfqFilter::new(), Pagination::new(2, 2)).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);

        let wf = wf.with_default_page_size(500);
        assert_eq!(wf.pagination(1).page_size, 100);
    }
}
