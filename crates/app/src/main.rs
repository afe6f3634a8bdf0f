use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use exportmart_catalog::{CategoryLookup, InMemoryCategoryCatalog};
use exportmart_events::{EventBus, EventEnvelope, InMemoryEventBus};
use exportmart_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use exportmart_infra::read_model::{
    InMemoryReadStore, InMemoryRfqReadStore, Pagination, PostgresDocumentStore,
    PostgresRfqReadStore, ReadStore, RfqReadStore,
};
use exportmart_infra::{
    AppConfig, MembershipReviews, RfqWorkflow, StoreKind, apply_seed, db, load_seed,
};
use exportmart_membership::{ApplicationId, ApplicationRecord, MembershipStatus};
use exportmart_rfq::{RfqFilter, RfqStatus};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

const APPLICATIONS_COLLECTION: &str = "membership_applications";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    exportmart_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(store = ?config.store, page_size = config.default_page_size, "starting exportmart");

    let catalog = Arc::new(InMemoryCategoryCatalog::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    match config.store {
        StoreKind::Memory => {
            let store = Arc::new(InMemoryEventStore::new());
            let workflow = RfqWorkflow::new(store.clone(), bus.clone(), InMemoryRfqReadStore::new(), catalog.clone())
                .with_default_page_size(config.default_page_size);
            let reviews = MembershipReviews::new(store, bus, InMemoryReadStore::<ApplicationId, ApplicationRecord>::new());
            run(&config, &catalog, &workflow, &reviews)
        }
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            let pool = PgPool::connect(url).await.context("failed to connect to Postgres")?;
            db::migrate(&pool).await.context("failed to apply schema")?;

            let store = Arc::new(PostgresEventStore::new(pool.clone()));
            let workflow = RfqWorkflow::new(store.clone(), bus.clone(), PostgresRfqReadStore::new(pool.clone()), catalog.clone())
                .with_default_page_size(config.default_page_size);
            let reviews = MembershipReviews::new(
                store,
                bus,
                PostgresDocumentStore::<ApplicationId, ApplicationRecord>::new(pool, APPLICATIONS_COLLECTION),
            );

            // A previous process may have stopped between an append and its read-model update.
            workflow.rebuild_read_model()?;
            reviews.rebuild_read_model()?;
            run(&config, &catalog, &workflow, &reviews)
        }
    }
}

fn run<S, B, R, C, P>(
    config: &AppConfig,
    catalog: &InMemoryCategoryCatalog,
    workflow: &RfqWorkflow<S, B, R, C>,
    reviews: &MembershipReviews<S, B, P>,
) -> anyhow::Result<()>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: RfqReadStore,
    C: CategoryLookup,
    P: ReadStore<ApplicationId, ApplicationRecord>,
{
    if let Some(path) = &config.seed_file {
        let document = load_seed(path)?;
        apply_seed(workflow, catalog, document)?;
    }

    let open = workflow.list_page(&RfqFilter::new().with_status(RfqStatus::Open), workflow.pagination(1))?;
    let awarded = workflow.list(&RfqFilter::new().with_status(RfqStatus::Awarded))?;
    let pending = reviews.list(Some(MembershipStatus::Pending), Pagination::default())?;

    tracing::info!(
        categories = catalog.len(),
        open_rfqs = open.total,
        awarded_rfqs = awarded.total,
        pending_applications = pending.total,
        "exportmart ready"
    );
    for rfq in &open.items {
        tracing::info!(rfq_id = %rfq.id, title = %rfq.title, responses = rfq.responses.len(), "open rfq");
    }
    Ok(())
}
