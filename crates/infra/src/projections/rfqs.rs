use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value as JsonValue;

use exportmart_core::AggregateId;
use exportmart_events::EventEnvelope;
use exportmart_rfq::{RfqEvent, RfqFilter, RfqId, RfqRecord};

use super::{ProjectionError, next_in_sequence};
use crate::event_store::EventStore;
use crate::read_model::{Pagination, RfqReadStore};

pub const RFQ_AGGREGATE_TYPE: &str = "rfq";

/// Builds the RFQ listing read model from RFQ streams.
///
/// Cursors are per stream and live in memory. The cursor lock is held for the
/// whole of an apply, so two threads catching up the same stream cannot
/// interleave their writes.
#[derive(Debug)]
pub struct RfqProjection<R>
where
    R: RfqReadStore,
{
    store: R,
    cursors: Mutex<HashMap<AggregateId, u64>>,
}

impl<R> RfqProjection<R>
where
    R: RfqReadStore,
{
    pub fn new(store: R) -> Self {
        Self {
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ProjectionError> {
        Ok(self.store.get(id)?)
    }

    pub fn query(
        &self,
        filter: &RfqFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<RfqRecord>, ProjectionError> {
        Ok(self.store.query(filter, pagination)?)
    }

    pub fn count(&self, filter: &RfqFilter) -> Result<u64, ProjectionError> {
        Ok(self.store.count(filter)?)
    }

    pub fn page(
        &self,
        filter: &RfqFilter,
        pagination: Pagination,
    ) -> Result<(Vec<RfqRecord>, u64), ProjectionError> {
        Ok(self.store.page(filter, pagination)?)
    }

    fn cursors(&self) -> Result<MutexGuard<'_, HashMap<AggregateId, u64>>, ProjectionError> {
        self.cursors.lock().map_err(|_| ProjectionError::Poisoned)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let mut cursors = self.cursors()?;
        self.apply_locked(&mut cursors, envelope)
    }

    /// Apply every event of one stream past the cursor, in order.
    ///
    /// Returns how many events were applied. Calling it again without new
    /// events is a no-op.
    pub fn catch_up<S>(&self, events: &S, aggregate_id: AggregateId) -> Result<usize, ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        let mut cursors = self.cursors()?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        let stream = events.load_stream(aggregate_id)?;
        let mut applied = 0;
        for stored in stream.iter().filter(|e| e.sequence_number > last) {
            self.apply_locked(&mut cursors, &stored.to_envelope())?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Clear the read model and replay the given envelopes.
    ///
    /// Envelopes are sorted by stream and sequence first, so callers may pass
    /// them in any order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: &[EventEnvelope<JsonValue>],
    ) -> Result<(), ProjectionError> {
        let mut cursors = self.cursors()?;
        self.store.clear()?;
        cursors.clear();

        let mut sorted: Vec<&EventEnvelope<JsonValue>> = envelopes.iter().collect();
        sorted.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for envelope in sorted {
            self.apply_locked(&mut cursors, envelope)?;
        }
        Ok(())
    }

    fn apply_locked(
        &self,
        cursors: &mut HashMap<AggregateId, u64>,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != RFQ_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        if !next_in_sequence(last, envelope.sequence_number())? {
            return Ok(());
        }

        let ev: RfqEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let rfq_id = ev.rfq_id();
        if rfq_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event rfq_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match &ev {
            RfqEvent::RfqCreated(e) => {
                self.store.upsert(RfqRecord::from_created(e))?;
            }
            RfqEvent::RfqDeleted(_) => {
                self.store.remove(&rfq_id)?;
            }
            other => match self.store.get(&rfq_id)? {
                Some(mut record) => {
                    record.evolve(other);
                    self.store.upsert(record)?;
                }
                None => {
                    tracing::warn!(
                        rfq_id = %rfq_id,
                        event_type = envelope.event_type(),
                        "rfq read model missing for update event; skipping"
                    );
                }
            },
        }

        cursors.insert(aggregate_id, envelope.sequence_number());
        Ok(())
    }
}
