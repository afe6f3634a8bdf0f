//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. The append with an expected version is
//! the serialization point for every write to an aggregate.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
