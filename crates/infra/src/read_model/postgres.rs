//! Postgres-backed read model stores.
//!
//! RFQs get their own table so listing filters and ordering run in SQL.
//! Other read models share `read_model_documents`, one JSONB document per key,
//! partitioned by collection name.
//!
//! Both stores call into async SQLx from the synchronous store traits, so they
//! must be used on a multi-threaded tokio runtime.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use exportmart_rfq::{RfqFilter, RfqId, RfqRecord};

use super::rfq_store::RfqReadStore;
use super::store::ReadStore;
use super::{Pagination, ReadModelError};
use crate::db;

fn backend(operation: &str, err: sqlx::Error) -> ReadModelError {
    ReadModelError::Backend(format!("{operation}: {err}"))
}

fn run<T>(
    fut: impl std::future::Future<Output = Result<T, ReadModelError>>,
) -> Result<T, ReadModelError> {
    db::block_on(fut).map_err(ReadModelError::Backend)?
}

fn decode_document<V: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<V, ReadModelError> {
    let document: JsonValue = row
        .try_get("document")
        .map_err(|e| ReadModelError::Backend(format!("failed to read document column: {e}")))?;
    serde_json::from_value(document).map_err(|e| ReadModelError::Serialization(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// RFQ listing table
// ─────────────────────────────────────────────────────────────────────────────

/// Postgres-backed RFQ read model (`rfq_read_models`).
///
/// Filter columns are denormalized next to the full JSONB document. Every
/// filter is an optional bind parameter, so one statement covers all
/// combinations and unset filters are no-ops.
#[derive(Debug, Clone)]
pub struct PostgresRfqReadStore {
    pool: Arc<PgPool>,
}

impl PostgresRfqReadStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

const FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR status = $1)
    AND ($2::text IS NULL OR category_id = $2)
    AND ($3::uuid IS NULL OR buyer_id = $3)
    AND ($4::uuid IS NULL OR (status = 'open' AND buyer_id <> $4))
"#;

struct FilterBinds {
    status: Option<&'static str>,
    category_id: Option<String>,
    buyer_id: Option<uuid::Uuid>,
    supplier_id: Option<uuid::Uuid>,
}

impl From<&RfqFilter> for FilterBinds {
    fn from(filter: &RfqFilter) -> Self {
        Self {
            status: filter.status.map(|s| s.as_str()),
            category_id: filter.category_id.as_ref().map(|c| c.as_str().to_string()),
            buyer_id: filter.buyer_id.map(|b| *b.as_uuid()),
            supplier_id: filter.supplier_id.map(|s| *s.as_uuid()),
        }
    }
}

impl RfqReadStore for PostgresRfqReadStore {
    #[instrument(skip(self), fields(rfq_id = %id), err)]
    fn get(&self, id: &RfqId) -> Result<Option<RfqRecord>, ReadModelError> {
        let pool = self.pool.clone();
        let id = *id.0.as_uuid();
        run(async move {
            let row = sqlx::query("SELECT document FROM rfq_read_models WHERE rfq_id = $1")
                .bind(id)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| backend("get_rfq", e))?;
            row.as_ref().map(decode_document::<RfqRecord>).transpose()
        })
    }

    #[instrument(skip(self, record), fields(rfq_id = %record.id), err)]
    fn upsert(&self, record: RfqRecord) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        let document =
            serde_json::to_value(&record).map_err(|e| ReadModelError::Serialization(e.to_string()))?;
        run(async move {
            sqlx::query(
                r#"
                INSERT INTO rfq_read_models (
                    rfq_id,
                    status,
                    category_id,
                    buyer_id,
                    created_at,
                    document
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (rfq_id)
                DO UPDATE SET
                    status = EXCLUDED.status,
                    category_id = EXCLUDED.category_id,
                    buyer_id = EXCLUDED.buyer_id,
                    created_at = EXCLUDED.created_at,
                    document = EXCLUDED.document,
                    updated_at = NOW()
                "#,
            )
            .bind(record.id.0.as_uuid())
            .bind(record.status.as_str())
            .bind(record.category.id.as_str())
            .bind(record.buyer.id.as_uuid())
            .bind(record.created_at)
            .bind(&document)
            .execute(&*pool)
            .await
            .map_err(|e| backend("upsert_rfq", e))?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(rfq_id = %id), err)]
    fn remove(&self, id: &RfqId) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        let id = *id.0.as_uuid();
        run(async move {
            sqlx::query("DELETE FROM rfq_read_models WHERE rfq_id = $1")
                .bind(id)
                .execute(&*pool)
                .await
                .map_err(|e| backend("remove_rfq", e))?;
            Ok(())
        })
    }

    #[instrument(skip(self), err)]
    fn query(
        &self,
        filter: &RfqFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<RfqRecord>, ReadModelError> {
        let pool = self.pool.clone();
        let binds = FilterBinds::from(filter);
        // LIMIT NULL means no limit in Postgres.
        let limit = pagination.map(|p| p.limit() as i64);
        let offset = pagination.map(|p| p.offset() as i64).unwrap_or(0);
        let sql = format!(
            "SELECT document FROM rfq_read_models WHERE {FILTER_CLAUSE} \
             ORDER BY created_at DESC, rfq_id ASC LIMIT $5 OFFSET $6"
        );
        run(async move {
            let rows = sqlx::query(&sql)
                .bind(binds.status)
                .bind(binds.category_id)
                .bind(binds.buyer_id)
                .bind(binds.supplier_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&*pool)
                .await
                .map_err(|e| backend("query_rfqs", e))?;
            rows.iter().map(decode_document).collect()
        })
    }

    #[instrument(skip(self), err)]
    fn count(&self, filter: &RfqFilter) -> Result<u64, ReadModelError> {
        let pool = self.pool.clone();
        let binds = FilterBinds::from(filter);
        let sql = format!("SELECT COUNT(*) AS total FROM rfq_read_models WHERE {FILTER_CLAUSE}");
        run(async move {
            let row = sqlx::query(&sql)
                .bind(binds.status)
                .bind(binds.category_id)
                .bind(binds.buyer_id)
                .bind(binds.supplier_id)
                .fetch_one(&*pool)
                .await
                .map_err(|e| backend("count_rfqs", e))?;
            let total: i64 = row.try_get("total").map_err(|e| backend("count_rfqs", e))?;
            Ok(total as u64)
        })
    }

    /// Items and total come from one statement via a window count.
    #[instrument(skip(self), err)]
    fn page(
        &self,
        filter: &RfqFilter,
        pagination: Pagination,
    ) -> Result<(Vec<RfqRecord>, u64), ReadModelError> {
        let pool = self.pool.clone();
        let binds = FilterBinds::from(filter);
        let limit = pagination.limit() as i64;
        let offset = pagination.offset() as i64;
        let sql = format!(
            "SELECT document, COUNT(*) OVER () AS total FROM rfq_read_models WHERE {FILTER_CLAUSE} \
             ORDER BY created_at DESC, rfq_id ASC LIMIT $5 OFFSET $6"
        );
        let (items, total) = run(async move {
            let rows = sqlx::query(&sql)
                .bind(binds.status)
                .bind(binds.category_id)
                .bind(binds.buyer_id)
                .bind(binds.supplier_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&*pool)
                .await
                .map_err(|e| backend("page_rfqs", e))?;
            let total = match rows.first() {
                Some(row) => {
                    let total: i64 = row.try_get("total").map_err(|e| backend("page_rfqs", e))?;
                    Some(total as u64)
                }
                None => None,
            };
            let items = rows
                .iter()
                .map(decode_document)
                .collect::<Result<Vec<RfqRecord>, _>>()?;
            Ok((items, total))
        })?;

        match total {
            Some(total) => Ok((items, total)),
            // Past the last page there is no row to carry the window count.
            None if offset > 0 => Ok((items, self.count(filter)?)),
            None => Ok((items, 0)),
        }
    }

    #[instrument(skip(self), err)]
    fn clear(&self) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        run(async move {
            sqlx::query("DELETE FROM rfq_read_models")
                .execute(&*pool)
                .await
                .map_err(|e| backend("clear_rfqs", e))?;
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic JSONB documents
// ─────────────────────────────────────────────────────────────────────────────

/// Postgres-backed key/value read model over `read_model_documents`.
///
/// Keys are stored in their `Display` form; values as JSONB.
#[derive(Debug)]
pub struct PostgresDocumentStore<K, V> {
    pool: Arc<PgPool>,
    collection: String,
    _key: PhantomData<fn() -> K>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> PostgresDocumentStore<K, V> {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(pool),
            collection: collection.into(),
            _key: PhantomData,
            _value: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl<K, V> ReadStore<K, V> for PostgresDocumentStore<K, V>
where
    K: Display + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        let pool = self.pool.clone();
        let collection = self.collection.clone();
        let key = key.to_string();
        run(async move {
            let row = sqlx::query(
                "SELECT document FROM read_model_documents WHERE collection = $1 AND doc_key = $2",
            )
            .bind(collection)
            .bind(key)
            .fetch_optional(&*pool)
            .await
            .map_err(|e| backend("get_document", e))?;
            row.as_ref().map(decode_document::<V>).transpose()
        })
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        let collection = self.collection.clone();
        let document =
            serde_json::to_value(&value).map_err(|e| ReadModelError::Serialization(e.to_string()))?;
        let key = key.to_string();
        run(async move {
            sqlx::query(
                r#"
                INSERT INTO read_model_documents (collection, doc_key, document)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, doc_key)
                DO UPDATE SET
                    document = EXCLUDED.document,
                    updated_at = NOW()
                "#,
            )
            .bind(collection)
            .bind(key)
            .bind(&document)
            .execute(&*pool)
            .await
            .map_err(|e| backend("upsert_document", e))?;
            Ok(())
        })
    }

    fn remove(&self, key: &K) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        let collection = self.collection.clone();
        let key = key.to_string();
        run(async move {
            sqlx::query("DELETE FROM read_model_documents WHERE collection = $1 AND doc_key = $2")
                .bind(collection)
                .bind(key)
                .execute(&*pool)
                .await
                .map_err(|e| backend("remove_document", e))?;
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<V>, ReadModelError> {
        let pool = self.pool.clone();
        let collection = self.collection.clone();
        run(async move {
            let rows = sqlx::query(
                "SELECT document FROM read_model_documents WHERE collection = $1 ORDER BY doc_key",
            )
            .bind(collection)
            .fetch_all(&*pool)
            .await
            .map_err(|e| backend("list_documents", e))?;
            rows.iter().map(decode_document).collect()
        })
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        let pool = self.pool.clone();
        let collection = self.collection.clone();
        run(async move {
            sqlx::query("DELETE FROM read_model_documents WHERE collection = $1")
                .bind(collection)
                .execute(&*pool)
                .await
                .map_err(|e| backend("clear_documents", e))?;
            Ok(())
        })
    }
}
