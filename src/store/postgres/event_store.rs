use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::event::SequencedEvent;
use crate::follower::Follower;
use crate::sql::event::DbEvent;
use crate::sql::migrations::Migrations;
use crate::sql::statements::EventStatements;
use crate::store::postgres::PgStoreError;
use crate::store::EventStore;
use crate::types::EventVersion;

/// Default Postgres implementation of the [`EventStore`], reading (and, for
/// producers, appending to) the `{follower}_events` table. Keys are stored in
/// their string form; payloads as JSONB documents.
pub struct PgEventStore<F>
where
    F: Follower,
{
    pool: Pool<Postgres>,
    statements: EventStatements,
    _follower: PhantomData<F>,
}

impl<F> PgEventStore<F>
where
    F: Follower,
{
    /// Creates the store, running the idempotent setup migrations (table plus
    /// the unique `(key, version)` index) inside one transaction.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if running the migrations fails.
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, sqlx::Error> {
        let statements = EventStatements::new(F::NAME);
        Migrations::run(
            &pool,
            &[statements.create_table(), statements.create_unique_index()],
        )
        .await?;

        Ok(Self {
            pool,
            statements,
            _follower: PhantomData,
        })
    }

    /// Creates the store without touching the schema, for databases migrated
    /// out of band.
    pub fn without_migrations(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            statements: EventStatements::new(F::NAME),
            _follower: PhantomData,
        }
    }

    /// Returns the name of the event store table
    pub fn table_name(&self) -> &str {
        self.statements.table_name()
    }

    /// Appends a single event to the log, stamped with the current wall
    /// clock. Returns `false` when `(key, version)` is already present —
    /// another producer won the race and the log is unchanged.
    pub async fn persist(
        &self,
        key: &F::Key,
        payload: &F::Event,
        version: EventVersion,
    ) -> Result<bool, PgStoreError> {
        let id: Uuid = Uuid::new_v4();
        let occurred_ms: i64 = Utc::now().timestamp_millis();

        let result = sqlx::query(self.statements.insert())
            .bind(id)
            .bind(key.to_string())
            .bind(Json(payload))
            .bind(occurred_ms)
            .bind(version)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl<F> EventStore for PgEventStore<F>
where
    F: Follower,
{
    type Follower = F;
    type Error = PgStoreError;

    async fn get_list(
        &self,
        key: &F::Key,
        after: EventVersion,
        up_to: EventVersion,
    ) -> Result<Vec<SequencedEvent<F::Event>>, Self::Error> {
        sqlx::query_as::<_, DbEvent>(self.statements.select_in_range())
            .bind(key.to_string())
            .bind(after)
            .bind(up_to)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|event| Ok(event.try_into_sequenced_event::<F::Event>()?))
            .collect()
    }
}

impl<F> Clone for PgEventStore<F>
where
    F: Follower,
{
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            statements: self.statements.clone(),
            _follower: PhantomData,
        }
    }
}

/// Debug implementation for [`PgEventStore`]. It just shows the statements,
/// that are the only thing that might be useful to debug.
impl<F: Follower> std::fmt::Debug for PgEventStore<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventStore")
            .field("statements", &self.statements)
            .finish()
    }
}
