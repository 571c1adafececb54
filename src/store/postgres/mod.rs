pub use event_store::PgEventStore;
pub use state_store::PgStateStore;
pub use transaction::PgTransactionBackend;

mod event_store;
mod state_store;
mod transaction;

#[derive(thiserror::Error, Debug)]
pub enum PgStoreError {
    /// Sql error
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    /// Serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A status code in the transactional log has no Rust-side counterpart
    #[error(transparent)]
    Status(#[from] crate::store::transaction::UnknownStatus),
}
