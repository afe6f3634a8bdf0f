//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus
//! ```
//!
//! Steps 1-4 are `execute()`, step 5 is `publish()`. `dispatch()` runs both.
//! Workflow services call them separately so read models are updated between
//! the append and the publication.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use exportmart_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use exportmart_events::{EventBus, EventEnvelope};

use crate::error::WorkflowError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// The result of a successful `execute()`.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    /// Aggregate state after the new events were applied.
    pub state: A,
    /// Events as persisted, with their sequence numbers.
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - **Atomicity**: events are persisted before publication; a failed append publishes nothing
/// - **Isolation**: each command operates on a single aggregate instance
/// - **Concurrency**: the append expects the version the aggregate was rebuilt from, so
///   two commands decided against the same state cannot both commit
///
/// ## Error Semantics
///
/// - Domain errors keep their kind (`Validation`, `NotFound`, `InvalidState`, ...)
/// - Version mismatch on append becomes `WorkflowError::Conflict`
/// - Bus failures become `WorkflowError::Publish` (the events are already durable)
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rebuild an aggregate from its stream without handling a command.
    ///
    /// A stream that was never written yields the fresh aggregate from `make_aggregate`.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, WorkflowError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Load, rehydrate, decide and append. Nothing is published.
    ///
    /// Returns the aggregate with the new events applied, so callers can read
    /// the resulting state without a second load.
    pub fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, WorkflowError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: exportmart_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                state: aggregate,
                committed: vec![],
            });
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            state: aggregate,
            committed,
        })
    }

    /// Publish committed events in sequence order.
    pub fn publish(&self, committed: &[StoredEvent]) -> Result<(), WorkflowError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| WorkflowError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }

    /// Dispatch a command through the full pipeline and return the committed events.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, WorkflowError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: exportmart_events::Event + Serialize + DeserializeOwned,
    {
        let Dispatched { committed, .. } =
            self.execute(aggregate_id, aggregate_type, command, make_aggregate)?;
        self.publish(&committed)?;
        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), WorkflowError> {
    // A backend returning foreign or reordered events would corrupt rehydration.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(WorkflowError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(WorkflowError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), WorkflowError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| WorkflowError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
