use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use exportmart_auth::Principal;
use exportmart_catalog::{CategoryId, CategoryRef};
use exportmart_core::{AggregateId, DomainError, DomainResult, Entity, UserId, ValueObject};

use crate::rfq::{RfqCreated, RfqEvent};

/// RFQ identifier (one event stream per RFQ).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RfqId(pub AggregateId);

impl RfqId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for RfqId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for RfqId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Response identifier, unique across RFQs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(Uuid);

impl ResponseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResponseId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ResponseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ResponseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("ResponseId: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statuses
// ─────────────────────────────────────────────────────────────────────────────

/// RFQ status lifecycle.
///
/// `open` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfqStatus {
    Open,
    Closed,
    Awarded,
    Cancelled,
}

impl RfqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfqStatus::Open => "open",
            RfqStatus::Closed => "closed",
            RfqStatus::Awarded => "awarded",
            RfqStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RfqStatus::Open)
    }
}

impl core::fmt::Display for RfqStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RfqStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RfqStatus::Open),
            "closed" => Ok(RfqStatus::Closed),
            "awarded" => Ok(RfqStatus::Awarded),
            "cancelled" => Ok(RfqStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown RFQ status '{other}'"))),
        }
    }
}

/// Supplier response status lifecycle: `pending` → `accepted` | `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Accepted => "accepted",
            ResponseStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ResponseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResponseStatus::Pending),
            "accepted" => Ok(ResponseStatus::Accepted),
            "rejected" => Ok(ResponseStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown response status '{other}'"
            ))),
        }
    }
}

/// Outcome a buyer picks for a pending response.
///
/// `Accept` also awards the RFQ; `Reject` only touches the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDecision {
    Accept,
    Reject,
}

impl ResponseDecision {
    pub fn resulting_status(&self) -> ResponseStatus {
        match self {
            ResponseDecision::Accept => ResponseStatus::Accepted,
            ResponseDecision::Reject => ResponseStatus::Rejected,
        }
    }
}

impl TryFrom<ResponseStatus> for ResponseDecision {
    type Error = DomainError;

    fn try_from(value: ResponseStatus) -> Result<Self, Self::Error> {
        match value {
            ResponseStatus::Accepted => Ok(ResponseDecision::Accept),
            ResponseStatus::Rejected => Ok(ResponseDecision::Reject),
            ResponseStatus::Pending => Err(DomainError::validation(
                "a response can only be set to accepted or rejected",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots and value objects
// ─────────────────────────────────────────────────────────────────────────────

/// Buyer contact details frozen at RFQ creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerRef {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl ValueObject for BuyerRef {}

impl From<&Principal> for BuyerRef {
    fn from(value: &Principal) -> Self {
        Self {
            id: value.user_id,
            name: value.name.clone(),
            email: value.email.clone(),
            company: value.company.clone(),
        }
    }
}

/// Supplier details frozen at response submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRef {
    pub id: UserId,
    pub name: String,
    pub company: String,
}

impl ValueObject for SupplierRef {}

impl From<&Principal> for SupplierRef {
    fn from(value: &Principal) -> Self {
        Self {
            id: value.user_id,
            name: value.name.clone(),
            // Sole traders register without a company; they trade under their own name.
            company: value.company.clone().unwrap_or_else(|| value.name.clone()),
        }
    }
}

/// Exact decimal amount in a three-letter currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Validate a quoted price: positive amount, upper-cased currency.
    pub fn normalized_price(&self) -> DomainResult<Money> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::validation("price amount must be positive"));
        }
        Ok(Money {
            amount: self.amount,
            currency: normalize_currency(&self.currency)?,
        })
    }
}

/// Requested quantity, e.g. 500 to 1000 "pieces".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityRange {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ValueObject for QuantityRange {}

impl QuantityRange {
    pub fn validate(&self) -> DomainResult<()> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min > max => Err(DomainError::validation(
                "quantity minimum cannot exceed maximum",
            )),
            _ => Ok(()),
        }
    }
}

/// Budget bracket the buyer is willing to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
    pub currency: String,
}

impl ValueObject for BudgetRange {}

impl BudgetRange {
    pub fn normalized(&self) -> DomainResult<BudgetRange> {
        for bound in [self.min, self.max].into_iter().flatten() {
            if bound < Decimal::ZERO {
                return Err(DomainError::validation("budget cannot be negative"));
            }
        }
        if matches!((self.min, self.max), (Some(min), Some(max)) if min > max) {
            return Err(DomainError::validation(
                "budget minimum cannot exceed maximum",
            ));
        }
        Ok(BudgetRange {
            min: self.min,
            max: self.max,
            currency: normalize_currency(&self.currency)?,
        })
    }
}

fn normalize_currency(code: &str) -> DomainResult<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!(
            "currency must be a three-letter code, got '{code}'"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Buyer-supplied input for creating an RFQ, before the category is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqForm {
    pub title: String,
    pub description: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub quantity: Option<QuantityRange>,
    #[serde(default)]
    pub budget: Option<BudgetRange>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}

impl RfqForm {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category_id: CategoryId::new(category_id),
            quantity: None,
            budget: None,
            deadline: None,
            specifications: BTreeMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read shape
// ─────────────────────────────────────────────────────────────────────────────

/// A supplier's quote against one RFQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqResponse {
    pub id: ResponseId,
    /// Lookup-only back-reference to the owning RFQ.
    pub rfq_id: RfqId,
    pub supplier: SupplierRef,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: ResponseStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for RfqResponse {
    type Id = ResponseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Current state of one RFQ with its responses in submission order.
///
/// Built by folding the RFQ's events; the aggregate and the read-model
/// projection share this fold so they cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqRecord {
    pub id: RfqId,
    pub title: String,
    pub description: String,
    pub category: CategoryRef,
    #[serde(default)]
    pub quantity: Option<QuantityRange>,
    #[serde(default)]
    pub budget: Option<BudgetRange>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    pub buyer: BuyerRef,
    pub status: RfqStatus,
    pub responses: Vec<RfqResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RfqRecord {
    pub fn from_created(e: &RfqCreated) -> Self {
        Self {
            id: e.rfq_id,
            title: e.title.clone(),
            description: e.description.clone(),
            category: e.category.clone(),
            quantity: e.quantity.clone(),
            budget: e.budget.clone(),
            deadline: e.deadline,
            specifications: e.specifications.clone(),
            buyer: e.buyer.clone(),
            status: RfqStatus::Open,
            responses: Vec::new(),
            created_at: e.occurred_at,
            updated_at: e.occurred_at,
        }
    }

    /// Apply a post-creation event.
    ///
    /// `RfqCreated` and `RfqDeleted` change whether a record exists at all and
    /// are handled by the owner of the `Option<RfqRecord>`.
    pub fn evolve(&mut self, event: &RfqEvent) {
        match event {
            RfqEvent::RfqCreated(_) | RfqEvent::RfqDeleted(_) => return,
            RfqEvent::ResponseSubmitted(e) => {
                self.responses.push(RfqResponse {
                    id: e.response_id,
                    rfq_id: e.rfq_id,
                    supplier: e.supplier.clone(),
                    price: e.price.clone(),
                    message: e.message.clone(),
                    status: ResponseStatus::Pending,
                    created_at: e.occurred_at,
                });
            }
            RfqEvent::ResponseAccepted(e) => {
                if let Some(r) = self.response_mut(&e.response_id) {
                    r.status = ResponseStatus::Accepted;
                }
                self.status = RfqStatus::Awarded;
            }
            RfqEvent::ResponseRejected(e) => {
                if let Some(r) = self.response_mut(&e.response_id) {
                    r.status = ResponseStatus::Rejected;
                }
            }
            RfqEvent::RfqStatusChanged(e) => {
                self.status = e.to;
            }
        }
        self.updated_at = event_time(event);
    }

    pub fn response(&self, id: &ResponseId) -> Option<&RfqResponse> {
        self.responses.iter().find(|r| r.id == *id)
    }

    fn response_mut(&mut self, id: &ResponseId) -> Option<&mut RfqResponse> {
        self.responses.iter_mut().find(|r| r.id == *id)
    }

    pub fn accepted_response(&self) -> Option<&RfqResponse> {
        self.responses
            .iter()
            .find(|r| r.status == ResponseStatus::Accepted)
    }

    pub fn is_open(&self) -> bool {
        self.status == RfqStatus::Open
    }

    /// Listing order: newest first, ties broken by id.
    pub fn listing_order(a: &RfqRecord, b: &RfqRecord) -> core::cmp::Ordering {
        b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
    }
}

fn event_time(event: &RfqEvent) -> DateTime<Utc> {
    use exportmart_events::Event;
    event.occurred_at()
}
