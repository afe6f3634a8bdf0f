//! Disposable read model storage.
//!
//! Everything here can be dropped and rebuilt from the event store; the
//! projections in `crate::projections` are the only writers.

pub mod page;
pub mod postgres;
pub mod rfq_store;
pub mod store;

use thiserror::Error;

pub use page::{Page, Pagination};
pub use postgres::{PostgresDocumentStore, PostgresRfqReadStore};
pub use rfq_store::{InMemoryRfqReadStore, RfqReadStore};
pub use store::{InMemoryReadStore, ReadStore};

#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("read model backend error: {0}")]
    Backend(String),

    #[error("read model document could not be (de)serialized: {0}")]
    Serialization(String),
}
