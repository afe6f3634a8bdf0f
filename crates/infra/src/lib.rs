//! Infrastructure layer: event stores, read models, projections and the
//! services that drive RFQ and membership commands through them.

pub mod command_dispatcher;
pub mod config;
pub mod db;
pub mod error;
pub mod event_store;
pub mod membership;
pub mod projections;
pub mod read_model;
pub mod seed;
pub mod workflow;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError, StoreKind};
pub use error::WorkflowError;
pub use membership::MembershipReviews;
pub use seed::{SeedDocument, SeedError, SeedSummary, apply_seed, load_seed};
pub use workflow::{RfqList, RfqWorkflow};
