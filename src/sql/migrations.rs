use sqlx::{Pool, Postgres, Transaction};

/// Runs idempotent setup statements for one store.
pub struct Migrations;

impl Migrations {
    /// Executes the given statements inside a single transaction. Every
    /// statement is `IF NOT EXISTS`-guarded, so running this at each startup
    /// is safe; it should still happen only at startup.
    pub async fn run(pool: &Pool<Postgres>, statements: &[String]) -> Result<(), sqlx::Error> {
        let mut transaction: Transaction<Postgres> = pool.begin().await?;

        for statement in statements {
            let _ = sqlx::query(statement.as_str()).execute(&mut *transaction).await?;
        }

        transaction.commit().await
    }
}
