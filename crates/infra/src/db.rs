//! Postgres plumbing shared by the adapters: schema setup and the bridge from
//! the synchronous store traits onto the tokio runtime.

use std::future::Future;

use sqlx::PgPool;

const SCHEMA: &str = include_str!("../migrations/0001_exportmart.sql");

/// Create the event and read-model tables if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("database schema is up to date");
    Ok(())
}

/// Run a future to completion from synchronous code on a multi-threaded runtime.
///
/// `block_in_place` hands the worker's other tasks off before blocking, so this
/// is safe to call from inside async request handlers.
pub(crate) fn block_on<F>(fut: F) -> Result<F::Output, String>
where
    F: Future,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        "Postgres adapters require a tokio runtime; call them from within one".to_string()
    })?;
    if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::CurrentThread {
        return Err("Postgres adapters require the multi-threaded tokio runtime".to_string());
    }
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}
