use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value as JsonValue;

use exportmart_core::{AggregateId, UserId};
use exportmart_events::EventEnvelope;
use exportmart_membership::{ApplicationId, ApplicationRecord, MembershipEvent, MembershipStatus};

use super::{ProjectionError, next_in_sequence};
use crate::event_store::EventStore;
use crate::read_model::ReadStore;

pub const MEMBERSHIP_AGGREGATE_TYPE: &str = "membership.application";

/// Admin review queue: one record per membership application.
#[derive(Debug)]
pub struct MembershipApplicationsProjection<S>
where
    S: ReadStore<ApplicationId, ApplicationRecord>,
{
    store: S,
    cursors: Mutex<HashMap<AggregateId, u64>>,
}

impl<S> MembershipApplicationsProjection<S>
where
    S: ReadStore<ApplicationId, ApplicationRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, ProjectionError> {
        Ok(self.store.get(id)?)
    }

    /// Newest submissions first.
    pub fn list(
        &self,
        status: Option<MembershipStatus>,
    ) -> Result<Vec<ApplicationRecord>, ProjectionError> {
        let mut out: Vec<ApplicationRecord> = self
            .store
            .list()?
            .into_iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn find_by_user(&self, user_id: UserId) -> Result<Option<ApplicationRecord>, ProjectionError> {
        Ok(self.store.list()?.into_iter().find(|a| a.user_id == user_id))
    }

    fn cursors(&self) -> Result<MutexGuard<'_, HashMap<AggregateId, u64>>, ProjectionError> {
        self.cursors.lock().map_err(|_| ProjectionError::Poisoned)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let mut cursors = self.cursors()?;
        self.apply_locked(&mut cursors, envelope)
    }

    pub fn catch_up<E>(&self, events: &E, aggregate_id: AggregateId) -> Result<usize, ProjectionError>
    where
        E: EventStore + ?Sized,
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
        if envelope.aggregate_type() != MEMBERSHIP_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        if !next_in_sequence(last, envelope.sequence_number())? {
            return Ok(());
        }

        let ev: MembershipEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let application_id = ev.application_id();
        if application_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event application_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match &ev {
            MembershipEvent::ApplicationSubmitted(e) => {
                self.store
                    .upsert(application_id, ApplicationRecord::from_submitted(e))?;
            }
            other => {
                if let Some(mut record) = self.store.get(&application_id)? {
                    record.evolve(other);
                    self.store.upsert(application_id, record)?;
                }
            }
        }

        cursors.insert(aggregate_id, envelope.sequence_number());
        Ok(())
    }
}
