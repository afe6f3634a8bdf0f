use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use exportmart_catalog::CategoryRef;
use exportmart_core::{Aggregate, AggregateRoot, DomainError};
use exportmart_events::Event;

use crate::model::{
    BudgetRange, BuyerRef, Money, QuantityRange, ResponseDecision, ResponseId, ResponseStatus,
    RfqId, RfqRecord, RfqStatus, SupplierRef,
};

/// Aggregate root: Rfq.
///
/// A stream holds at most one RFQ. After `RfqDeleted` the stream is closed:
/// the RFQ reads as missing and its id cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfq {
    id: RfqId,
    record: Option<RfqRecord>,
    deleted: bool,
    version: u64,
}

impl Rfq {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RfqId) -> Self {
        Self {
            id,
            record: None,
            deleted: false,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> RfqId {
        self.id
    }

    /// Current state, or `None` when never created or deleted.
    pub fn record(&self) -> Option<&RfqRecord> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<RfqRecord> {
        self.record
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Rfq {
    type Id = RfqId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: CreateRfq. The category arrives already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRfq {
    pub rfq_id: RfqId,
    pub buyer: BuyerRef,
    pub title: String,
    pub description: String,
    pub category: CategoryRef,
    pub quantity: Option<QuantityRange>,
    pub budget: Option<BudgetRange>,
    pub deadline: Option<NaiveDate>,
    pub specifications: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitResponse (only while the RFQ is open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub rfq_id: RfqId,
    pub response_id: ResponseId,
    pub supplier: SupplierRef,
    pub price: Money,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideResponse (accept or reject a pending response).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideResponse {
    pub rfq_id: RfqId,
    pub response_id: ResponseId,
    pub decision: ResponseDecision,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus (manual close or cancel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub rfq_id: RfqId,
    pub status: RfqStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteRfq.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRfq {
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RfqCommand {
    CreateRfq(CreateRfq),
    SubmitResponse(SubmitResponse),
    DecideResponse(DecideResponse),
    ChangeStatus(ChangeStatus),
    DeleteRfq(DeleteRfq),
}

impl RfqCommand {
    pub fn rfq_id(&self) -> RfqId {
        match self {
            RfqCommand::CreateRfq(c) => c.rfq_id,
            RfqCommand::SubmitResponse(c) => c.rfq_id,
            RfqCommand::DecideResponse(c) => c.rfq_id,
            RfqCommand::ChangeStatus(c) => c.rfq_id,
            RfqCommand::DeleteRfq(c) => c.rfq_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: RfqCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqCreated {
    pub rfq_id: RfqId,
    pub buyer: BuyerRef,
    pub title: String,
    pub description: String,
    pub category: CategoryRef,
    pub quantity: Option<QuantityRange>,
    pub budget: Option<BudgetRange>,
    pub deadline: Option<NaiveDate>,
    pub specifications: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ResponseSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSubmitted {
    pub rfq_id: RfqId,
    pub response_id: ResponseId,
    pub supplier: SupplierRef,
    pub price: Money,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ResponseAccepted.
///
/// Accepts the response and awards the RFQ in one fact, so the two changes
/// commit or fail together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAccepted {
    pub rfq_id: RfqId,
    pub response_id: ResponseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ResponseRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRejected {
    pub rfq_id: RfqId,
    pub response_id: ResponseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RfqStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqStatusChanged {
    pub rfq_id: RfqId,
    pub from: RfqStatus,
    pub to: RfqStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RfqDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqDeleted {
    pub rfq_id: RfqId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RfqEvent {
    RfqCreated(RfqCreated),
    ResponseSubmitted(ResponseSubmitted),
    ResponseAccepted(ResponseAccepted),
    ResponseRejected(ResponseRejected),
    RfqStatusChanged(RfqStatusChanged),
    RfqDeleted(RfqDeleted),
}

impl RfqEvent {
    pub fn rfq_id(&self) -> RfqId {
        match self {
            RfqEvent::RfqCreated(e) => e.rfq_id,
            RfqEvent::ResponseSubmitted(e) => e.rfq_id,
            RfqEvent::ResponseAccepted(e) => e.rfq_id,
            RfqEvent::ResponseRejected(e) => e.rfq_id,
            RfqEvent::RfqStatusChanged(e) => e.rfq_id,
            RfqEvent::RfqDeleted(e) => e.rfq_id,
        }
    }
}

impl Event for RfqEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RfqEvent::RfqCreated(_) => "rfq.created",
            RfqEvent::ResponseSubmitted(_) => "rfq.response_submitted",
            RfqEvent::ResponseAccepted(_) => "rfq.response_accepted",
            RfqEvent::ResponseRejected(_) => "rfq.response_rejected",
            RfqEvent::RfqStatusChanged(_) => "rfq.status_changed",
            RfqEvent::RfqDeleted(_) => "rfq.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RfqEvent::RfqCreated(e) => e.occurred_at,
            RfqEvent::ResponseSubmitted(e) => e.occurred_at,
            RfqEvent::ResponseAccepted(e) => e.occurred_at,
            RfqEvent::ResponseRejected(e) => e.occurred_at,
            RfqEvent::RfqStatusChanged(e) => e.occurred_at,
            RfqEvent::RfqDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Rfq {
    type Command = RfqCommand;
    type Event = RfqEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RfqEvent::RfqCreated(e) => {
                self.id = e.rfq_id;
                self.record = Some(RfqRecord::from_created(e));
            }
            RfqEvent::RfqDeleted(_) => {
                self.record = None;
                self.deleted = true;
            }
            other => {
                if let Some(record) = self.record.as_mut() {
                    record.evolve(other);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RfqCommand::CreateRfq(cmd) => self.handle_create(cmd),
            RfqCommand::SubmitResponse(cmd) => self.handle_submit_response(cmd),
            RfqCommand::DecideResponse(cmd) => self.handle_decide(cmd),
            RfqCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            RfqCommand::DeleteRfq(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Rfq {
    fn existing(&self, rfq_id: RfqId) -> Result<&RfqRecord, DomainError> {
        if self.id != rfq_id {
            return Err(DomainError::invalid_id("rfq_id does not match the loaded stream"));
        }
        self.record.as_ref().ok_or_else(|| DomainError::not_found("RFQ"))
    }

    fn handle_create(&self, cmd: &CreateRfq) -> Result<Vec<RfqEvent>, DomainError> {
        if self.record.is_some() || self.deleted {
            return Err(DomainError::conflict("RFQ already exists"));
        }

        let title = cmd.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        let description = cmd.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        if cmd.buyer.name.trim().is_empty() || cmd.buyer.email.trim().is_empty() {
            return Err(DomainError::validation("buyer name and email are required"));
        }
        if let Some(quantity) = &cmd.quantity {
            quantity.validate()?;
        }
        let budget = cmd.budget.as_ref().map(BudgetRange::normalized).transpose()?;

        Ok(vec![RfqEvent::RfqCreated(RfqCreated {
            rfq_id: cmd.rfq_id,
            buyer: cmd.buyer.clone(),
            title: title.to_string(),
            description: description.to_string(),
            category: cmd.category.clone(),
            quantity: cmd.quantity.clone(),
            budget,
            deadline: cmd.deadline,
            specifications: cmd.specifications.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit_response(&self, cmd: &SubmitResponse) -> Result<Vec<RfqEvent>, DomainError> {
        let record = self.existing(cmd.rfq_id)?;

        // Invariant: responses accumulate only while the RFQ is open.
        if !record.is_open() {
            return Err(DomainError::invalid_state("RFQ is not open for responses"));
        }
        if record.response(&cmd.response_id).is_some() {
            return Err(DomainError::conflict("response already exists"));
        }

        let price = cmd.price.normalized_price()?;
        let message = cmd
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Ok(vec![RfqEvent::ResponseSubmitted(ResponseSubmitted {
            rfq_id: cmd.rfq_id,
            response_id: cmd.response_id,
            supplier: cmd.supplier.clone(),
            price,
            message,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide(&self, cmd: &DecideResponse) -> Result<Vec<RfqEvent>, DomainError> {
        let record = self.existing(cmd.rfq_id)?;
        let response = record
            .response(&cmd.response_id)
            .ok_or_else(|| DomainError::not_found("Response"))?;

        // Invariant: accepted and rejected are final.
        if response.status != ResponseStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "response has already been {}",
                response.status
            )));
        }

        match cmd.decision {
            ResponseDecision::Accept => {
                // Invariant: at most one accepted response; awarding requires an open RFQ.
                if !record.is_open() {
                    return Err(DomainError::invalid_state(format!(
                        "cannot accept a response on a {} RFQ",
                        record.status
                    )));
                }
                Ok(vec![RfqEvent::ResponseAccepted(ResponseAccepted {
                    rfq_id: cmd.rfq_id,
                    response_id: cmd.response_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ResponseDecision::Reject => Ok(vec![RfqEvent::ResponseRejected(ResponseRejected {
                rfq_id: cmd.rfq_id,
                response_id: cmd.response_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<RfqEvent>, DomainError> {
        let record = self.existing(cmd.rfq_id)?;

        match cmd.status {
            RfqStatus::Closed | RfqStatus::Cancelled => {}
            RfqStatus::Awarded => {
                return Err(DomainError::validation(
                    "an RFQ is awarded by accepting a response",
                ));
            }
            RfqStatus::Open => {
                return Err(DomainError::validation("an RFQ cannot be reopened"));
            }
        }

        if record.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "RFQ is already {}",
                record.status
            )));
        }

        Ok(vec![RfqEvent::RfqStatusChanged(RfqStatusChanged {
            rfq_id: cmd.rfq_id,
            from: record.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteRfq) -> Result<Vec<RfqEvent>, DomainError> {
        let record = self.existing(cmd.rfq_id)?;

        if !record.responses.is_empty() {
            return Err(DomainError::invalid_state(
                "RFQ has responses and cannot be deleted",
            ));
        }

        Ok(vec![RfqEvent::RfqDeleted(RfqDeleted {
            rfq_id: cmd.rfq_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
