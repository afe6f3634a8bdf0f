//! Projection implementations (read model builders).
//!
//! Projections consume event envelopes and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event stream
//! - **Idempotent**: envelopes at or below the stream cursor are skipped
//! - **Ordered**: a gap in a stream's sequence numbers is an error, never skipped over

pub mod membership_applications;
pub mod rfqs;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use exportmart_core::AggregateId;

use crate::event_store::EventStoreError;
use crate::read_model::ReadModelError;

pub use membership_applications::{MEMBERSHIP_AGGREGATE_TYPE, MembershipApplicationsProjection};
pub use rfqs::{RFQ_AGGREGATE_TYPE, RfqProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("event does not belong to its stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection cursor lock poisoned")]
    Poisoned,

    #[error(transparent)]
    ReadModel(#[from] ReadModelError),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Decide whether an envelope at `found` follows a cursor at `last`.
///
/// `Ok(false)` means already applied.
pub(crate) fn next_in_sequence(last: u64, found: u64) -> Result<bool, ProjectionError> {
    if found == 0 || found > last + 1 {
        return Err(ProjectionError::NonMonotonicSequence { last, found });
    }
    Ok(found == last + 1)
}

/// Streams whose events committed but whose read-model update failed.
///
/// Services mark a stream here instead of failing the write, and retry it
/// before the next read-model query.
#[derive(Debug, Default)]
pub struct StaleStreams {
    ids: Mutex<HashSet<AggregateId>>,
}

impl StaleStreams {
    pub fn new() -> Self {
        Self::default()
    }

    // A set of ids cannot be left half-updated, so a poisoned lock is reused.
    fn ids(&self) -> MutexGuard<'_, HashSet<AggregateId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, aggregate_id: AggregateId) {
        self.ids().insert(aggregate_id);
    }

    pub fn contains(&self, aggregate_id: &AggregateId) -> bool {
        self.ids().contains(aggregate_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Run `catch_up` for every marked stream.
    ///
    /// Streams that catch up are unmarked; the rest stay marked and the first
    /// failure is returned.
    pub fn heal<F>(&self, mut catch_up: F) -> Result<(), ProjectionError>
    where
        F: FnMut(AggregateId) -> Result<usize, ProjectionError>,
    {
        let mut ids = self.ids();
        let mut first_err = None;
        ids.retain(|id| match catch_up(*id) {
            Ok(_) => false,
            Err(err) => {
                first_err.get_or_insert(err);
                true
            }
        });
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
