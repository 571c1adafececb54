use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::sql::commit::DbCommit;
use crate::sql::migrations::Migrations;
use crate::sql::statements::CommitStatements;
use crate::store::postgres::PgStoreError;
use crate::store::transaction::{AppendRequest, TransactionBackend, TransactionStatus};

const DEFAULT_TABLE: &str = "transaction_records";

/// Default Postgres implementation of the [`TransactionBackend`]. The bulk
/// phase runs all inserts of a batch inside one transaction; the fallback
/// inserts rows one by one, each its own atomic write, reading the backend's
/// unique-violation category as the duplicate signal.
pub struct PgTransactionBackend {
    pool: Pool<Postgres>,
    statements: CommitStatements,
}

impl PgTransactionBackend {
    /// Creates the backend on the default `transaction_records` table,
    /// running the idempotent setup migrations.
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, sqlx::Error> {
        Self::with_table(pool, DEFAULT_TABLE).await
    }

    /// Creates the backend on a caller-named table.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if running the migrations fails.
    pub async fn with_table(pool: Pool<Postgres>, table_name: &str) -> Result<Self, sqlx::Error> {
        let statements = CommitStatements::new(table_name);
        Migrations::run(
            &pool,
            &[statements.create_table(), statements.create_unique_index()],
        )
        .await?;

        Ok(Self { pool, statements })
    }

    /// Returns the name of the commit log table
    pub fn table_name(&self) -> &str {
        self.statements.table_name()
    }
}

#[async_trait]
impl TransactionBackend for PgTransactionBackend {
    type Error = PgStoreError;

    async fn insert_bulk(&self, rows: &[AppendRequest]) -> Result<(), Self::Error> {
        let mut transaction: Transaction<Postgres> = self.pool.begin().await?;

        for row in rows {
            let _ = sqlx::query(self.statements.insert())
                .bind(&row.unit_name)
                .bind(row.transaction_id)
                .bind(&row.data)
                .bind(i32::from(row.status))
                .execute(&mut *transaction)
                .await?;
        }

        // An early return above drops the transaction, rolling it back.
        Ok(transaction.commit().await?)
    }

    async fn insert_one(&self, row: &AppendRequest) -> Result<bool, Self::Error> {
        let result = sqlx::query(self.statements.insert())
            .bind(&row.unit_name)
            .bind(row.transaction_id)
            .bind(&row.data)
            .bind(i32::from(row.status))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, unit_name: &str, transaction_id: i64) -> Result<(), Self::Error> {
        let _ = sqlx::query(self.statements.delete())
            .bind(unit_name)
            .bind(transaction_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_list(&self, unit_name: &str) -> Result<Vec<AppendRequest>, Self::Error> {
        sqlx::query_as::<_, DbCommit>(self.statements.select_by_unit())
            .bind(unit_name)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| Ok(AppendRequest::try_from(row)?))
            .collect()
    }

    async fn update_status(
        &self,
        unit_name: &str,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<bool, Self::Error> {
        let result = sqlx::query(self.statements.update_status())
            .bind(unit_name)
            .bind(transaction_id)
            .bind(i32::from(status))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl Clone for PgTransactionBackend {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            statements: self.statements.clone(),
        }
    }
}

impl std::fmt::Debug for PgTransactionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransactionBackend")
            .field("statements", &self.statements)
            .finish()
    }
}
