//! RFQ domain module (requests for quotation and supplier responses, event-sourced).
//!
//! This crate contains the business rules of the RFQ lifecycle as deterministic
//! domain logic (no IO, no HTTP, no storage). Category resolution and clock
//! reads happen in the caller and arrive inside commands.

pub mod filter;
pub mod model;
pub mod policy;
pub mod rfq;

pub use filter::RfqFilter;
pub use model::{
    BudgetRange, BuyerRef, Money, QuantityRange, ResponseDecision, ResponseId, ResponseStatus,
    RfqForm, RfqId, RfqRecord, RfqResponse, RfqStatus, SupplierRef,
};
pub use policy::{RfqAction, authorize};
pub use rfq::{
    ChangeStatus, CreateRfq, DecideResponse, DeleteRfq, ResponseAccepted, ResponseRejected,
    ResponseSubmitted, Rfq, RfqCommand, RfqCreated, RfqDeleted, RfqEvent, RfqStatusChanged,
    SubmitResponse,
};
