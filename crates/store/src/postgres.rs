use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, AggregateRecord, EventEnvelope, EventId, RecordQuery, Result, StoreError,
    Version,
    store::{AggregateStore, StoreTransaction},
};

const RECORD_COLUMNS: &str = "aggregate_id, aggregate_type, version, state, index_terms, updated_at";

/// PostgreSQL-backed aggregate store.
///
/// Records live in the `aggregates` table, keyed by (type, id). Loads inside a
/// transaction take a row lock, and saves are guarded by the version the row
/// was read at, so a writer that lost a race gets
/// [`StoreError::ConcurrencyConflict`] instead of overwriting.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool with the given connection limit.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<AggregateRecord> {
        Ok(AggregateRecord {
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            index_terms: row.try_get("index_terms")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl AggregateStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }

    async fn load(&self, aggregate_type: &str, id: AggregateId) -> Result<Option<AggregateRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM aggregates WHERE aggregate_type = $1 AND aggregate_id = $2"
        ))
        .bind(aggregate_type)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn find(&self, query: &RecordQuery) -> Result<Vec<AggregateRecord>> {
        let rows = find_query(query).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_id, aggregate_type, version, occurred_at, payload, metadata
            FROM outbox
            WHERE dispatched_at IS NULL
            ORDER BY sequence ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<()> {
        let ids: Vec<Uuid> = event_ids.iter().map(EventId::as_uuid).collect();
        sqlx::query(
            "UPDATE outbox SET dispatched_at = NOW() WHERE event_id = ANY($1) AND dispatched_at IS NULL",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_dispatched(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM outbox WHERE dispatched_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

fn find_query(query: &RecordQuery) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    // LIMIT NULL means no limit in PostgreSQL.
    sqlx::query(
        r#"
        SELECT aggregate_id, aggregate_type, version, state, index_terms, updated_at
        FROM aggregates
        WHERE aggregate_type = $1 AND $2 = ANY(index_terms)
        ORDER BY aggregate_id ASC
        LIMIT $3
        "#,
    )
    .bind(&query.aggregate_type)
    .bind(&query.index_term)
    .bind(query.limit.map(|l| l as i64))
}

/// A unit of work backed by a PostgreSQL transaction.
///
/// Dropping it without committing rolls the database transaction back.
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::TransactionClosed),
        }
    }

    async fn conflict(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
        expected: Version,
    ) -> StoreError {
        let actual = match self.conn() {
            Ok(conn) => sqlx::query_scalar::<_, i64>(
                "SELECT version FROM aggregates WHERE aggregate_type = $1 AND aggregate_id = $2",
            )
            .bind(aggregate_type)
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
            .ok()
            .flatten()
            .map(Version::new)
            .unwrap_or_default(),
            Err(e) => return e,
        };

        metrics::counter!("store_conflicts_total").increment(1);
        StoreError::ConcurrencyConflict {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: id,
            expected,
            actual,
        }
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn load(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Option<AggregateRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM aggregates WHERE aggregate_type = $1 AND aggregate_id = $2 FOR UPDATE"
        ))
        .bind(aggregate_type)
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await?;

        row.map(PostgresStore::row_to_record).transpose()
    }

    async fn find(&mut self, query: &RecordQuery) -> Result<Vec<AggregateRecord>> {
        let rows = find_query(query).fetch_all(self.conn()?).await?;
        rows.into_iter().map(PostgresStore::row_to_record).collect()
    }

    async fn save(&mut self, record: AggregateRecord) -> Result<Version> {
        let expected = record.version;
        let new_version = expected.next();

        let affected = if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO aggregates (aggregate_type, aggregate_id, version, state, index_terms, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (aggregate_type, aggregate_id) DO NOTHING
                "#,
            )
            .bind(&record.aggregate_type)
            .bind(record.aggregate_id.as_uuid())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(&record.index_terms)
            .execute(self.conn()?)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE aggregates
                SET version = $3, state = $4, index_terms = $5, updated_at = NOW()
                WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $6
                "#,
            )
            .bind(&record.aggregate_type)
            .bind(record.aggregate_id.as_uuid())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .bind(&record.index_terms)
            .bind(expected.as_i64())
            .execute(self.conn()?)
            .await?
            .rows_affected()
        };

        if affected == 0 {
            return Err(self
                .conflict(&record.aggregate_type, record.aggregate_id, expected)
                .await);
        }
        Ok(new_version)
    }

    async fn delete(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
        expected: Version,
    ) -> Result<()> {
        let affected = sqlx::query(
            "DELETE FROM aggregates WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $3",
        )
        .bind(aggregate_type)
        .bind(id.as_uuid())
        .bind(expected.as_i64())
        .execute(self.conn()?)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(self.conflict(aggregate_type, id, expected).await);
        }
        Ok(())
    }

    async fn append_outbox(&mut self, events: Vec<EventEnvelope>) -> Result<()> {
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO outbox (event_id, event_type, aggregate_id, aggregate_type, version, occurred_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(self.conn()?)
            .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
