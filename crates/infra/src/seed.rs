//! Demo data loader.
//!
//! A seed document is replayed through the public workflow operations, so
//! seeded RFQs obey the same rules as live ones and produce the same events.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use exportmart_catalog::{Category, CategoryLookup, InMemoryCategoryCatalog};
use exportmart_events::{EventBus, EventEnvelope};
use exportmart_rfq::{BuyerRef, Money, ResponseStatus, RfqForm, RfqStatus, SupplierRef};

use crate::error::WorkflowError;
use crate::event_store::EventStore;
use crate::read_model::RfqReadStore;
use crate::workflow::RfqWorkflow;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("seed RFQ '{title}' was refused: {source}")]
    Workflow {
        title: String,
        #[source]
        source: WorkflowError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub rfqs: Vec<SeedRfq>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRfq {
    pub buyer: BuyerRef,
    pub form: RfqForm,
    #[serde(default)]
    pub responses: Vec<SeedResponse>,
    /// Final manual status (`closed` or `cancelled`); awards come from decisions.
    #[serde(default)]
    pub status: Option<RfqStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    pub supplier: SupplierRef,
    pub price: Money,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub decision: Option<ResponseStatus>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub rfqs: usize,
    pub responses: usize,
}

pub fn load_seed(path: impl AsRef<Path>) -> Result<SeedDocument, SeedError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Register the categories, then create each RFQ with its responses,
/// decisions and final status.
///
/// `catalog` must be the catalog the workflow resolves categories from.
pub fn apply_seed<S, B, R, C>(
    workflow: &RfqWorkflow<S, B, R, C>,
    catalog: &InMemoryCategoryCatalog,
    document: SeedDocument,
) -> Result<SeedSummary, SeedError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: RfqReadStore,
    C: CategoryLookup,
{
    let mut summary = SeedSummary::default();

    for category in document.categories {
        catalog.insert(category);
        summary.categories += 1;
    }

    for seed in document.rfqs {
        let title = seed.form.title.clone();
        let refused = |source: WorkflowError| SeedError::Workflow {
            title: title.clone(),
            source,
        };

        let rfq = workflow.create(seed.buyer, seed.form).map_err(refused)?;
        summary.rfqs += 1;

        for response in seed.responses {
            let submitted = workflow
                .submit_response(rfq.id, response.supplier, response.price, response.message)
                .map_err(refused)?;
            summary.responses += 1;

            if let Some(decision) = response.decision {
                workflow
                    .update_response_status(rfq.id, submitted.id, decision)
                    .map_err(refused)?;
            }
        }

        if let Some(status) = seed.status {
            workflow.update_status(rfq.id, status).map_err(refused)?;
        }
    }

    info!(
        categories = summary.categories,
        rfqs = summary.rfqs,
        responses = summary.responses,
        "seed data loaded"
    );
    Ok(summary)
}
