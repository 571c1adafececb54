use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use crate::follower::Follower;
use crate::sql::migrations::Migrations;
use crate::sql::state::DbState;
use crate::sql::statements::StateStatements;
use crate::state::FollowerState;
use crate::store::postgres::PgStoreError;
use crate::store::StateStore;

/// Default Postgres implementation of the [`StateStore`], holding one
/// snapshot row per key in the `{follower}_snapshots` table.
pub struct PgStateStore<F>
where
    F: Follower,
{
    pool: Pool<Postgres>,
    statements: StateStatements,
    _follower: PhantomData<F>,
}

impl<F> PgStateStore<F>
where
    F: Follower,
{
    /// Creates the store, running the idempotent setup migration.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if running the migration fails.
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, sqlx::Error> {
        let statements = StateStatements::new(F::NAME);
        Migrations::run(&pool, &[statements.create_table()]).await?;

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
            statements: StateStatements::new(F::NAME),
            _follower: PhantomData,
        }
    }

    /// Returns the name of the snapshot table
    pub fn table_name(&self) -> &str {
        self.statements.table_name()
    }
}

#[async_trait]
impl<F> StateStore for PgStateStore<F>
where
    F: Follower,
{
    type Follower = F;
    type Error = PgStoreError;

    async fn get(&self, key: &F::Key) -> Result<Option<FollowerState<F::Key, F::State>>, Self::Error> {
        sqlx::query_as::<_, DbState>(self.statements.select_by_key())
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Ok(row.try_into_follower_state(key.clone())?))
            .transpose()
    }

    async fn insert(&self, state: &FollowerState<F::Key, F::State>) -> Result<(), Self::Error> {
        let _ = sqlx::query(self.statements.insert())
            .bind(state.key.to_string())
            .bind(Json(&state.inner))
            .bind(state.version)
            .bind(state.doing_version)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update(&self, state: &FollowerState<F::Key, F::State>) -> Result<(), Self::Error> {
        let _ = sqlx::query(self.statements.update())
            .bind(state.key.to_string())
            .bind(Json(&state.inner))
            .bind(state.version)
            .bind(state.doing_version)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &F::Key) -> Result<(), Self::Error> {
        let _ = sqlx::query(self.statements.delete_by_key())
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl<F> Clone for PgStateStore<F>
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

impl<F: Follower> std::fmt::Debug for PgStateStore<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStateStore")
            .field("statements", &self.statements)
            .finish()
    }
}
