use thiserror::Error;

use exportmart_core::DomainError;

use crate::event_store::EventStoreError;
use crate::projections::ProjectionError;
use crate::read_model::ReadModelError;

/// What callers of the workflow services see.
///
/// Domain failures keep their kind and message; storage failures are wrapped.
/// Mapping to transport codes is the caller's job.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Carries the entity name: "RFQ", "Response", "membership application".
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Optimistic concurrency failure or duplicate creation. Nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A stored payload no longer matches the event schema.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(#[source] EventStoreError),

    /// Publication failed after a successful append (events are durable).
    #[error("event publication failed: {0}")]
    Publish(String),

    #[error("read model failure: {0}")]
    ReadModel(#[from] ReadModelError),

    /// The write committed but the read model could not follow it.
    #[error("projection failure: {0}")]
    Projection(String),
}

impl WorkflowError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Conflict(_))
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => WorkflowError::Validation(msg),
            DomainError::NotFound(entity) => WorkflowError::NotFound(entity),
            DomainError::InvalidState(msg) => WorkflowError::InvalidState(msg),
            DomainError::InvalidId(msg) => WorkflowError::Validation(msg),
            DomainError::Conflict(msg) => WorkflowError::Conflict(msg),
            DomainError::Unauthorized(msg) => WorkflowError::Unauthorized(msg),
        }
    }
}

impl From<EventStoreError> for WorkflowError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => WorkflowError::Conflict(msg),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<ProjectionError> for WorkflowError {
    fn from(value: ProjectionError) -> Self {
        match value {
            ProjectionError::ReadModel(e) => WorkflowError::ReadModel(e),
            ProjectionError::Store(e) => WorkflowError::from(e),
            ProjectionError::Deserialize(msg) => WorkflowError::Deserialize(msg),
            other => WorkflowError::Projection(other.to_string()),
        }
    }
}
