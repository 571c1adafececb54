use crate::store::transaction::{AppendRequest, TransactionStatus, UnknownStatus};

/// Commit representation on the transactional log
#[derive(sqlx::FromRow, Debug)]
pub struct DbCommit {
    pub unit_name: String,
    pub transaction_id: i64,
    pub data: String,
    pub status: i32,
}

impl TryFrom<DbCommit> for AppendRequest {
    type Error = UnknownStatus;

    fn try_from(row: DbCommit) -> Result<Self, Self::Error> {
        Ok(Self {
            unit_name: row.unit_name,
            transaction_id: row.transaction_id,
            data: row.data,
            status: TransactionStatus::try_from(row.status)?,
        })
    }
}
