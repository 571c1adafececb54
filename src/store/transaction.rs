//! The batched transactional append store.
//!
//! Producers from many tasks call [`TransactionStore::append`]; appends are
//! funneled through a bounded [`CoalescingChannel`] and written by a single
//! consumer as one bulk transaction per batch. When the bulk transaction
//! aborts, every row is retried as its own atomic write, with a duplicate
//! `(unit_name, transaction_id)` key reported back as `false` rather than an
//! error — the signal that an earlier attempt already appended the row.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::channel::{AsyncItem, BatchConsumer, ChannelConfig, CoalescingChannel};

/// Lifecycle of a unit-scoped commit in the transactional log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Persisted,
    Committed,
    Rolledback,
}

impl From<TransactionStatus> for i32 {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Persisted => 0,
            TransactionStatus::Committed => 1,
            TransactionStatus::Rolledback => 2,
        }
    }
}

/// A status code read back from the log has no Rust-side counterpart.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status code {0}")]
pub struct UnknownStatus(pub i32);

impl TryFrom<i32> for TransactionStatus {
    type Error = UnknownStatus;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TransactionStatus::Persisted),
            1 => Ok(TransactionStatus::Committed),
            2 => Ok(TransactionStatus::Rolledback),
            other => Err(UnknownStatus(other)),
        }
    }
}

/// A unit-scoped commit record as producers hand it in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commit<I> {
    pub transaction_id: i64,
    pub data: I,
    pub status: TransactionStatus,
}

/// The row form of a commit, as it lands in the transactional log. The log
/// holds at most one row per `(unit_name, transaction_id)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendRequest {
    pub unit_name: String,
    pub transaction_id: i64,
    pub data: String,
    pub status: TransactionStatus,
}

/// Storage contract underneath the [`TransactionStore`].
#[async_trait]
pub trait TransactionBackend: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Inserts every row within a single transaction, all-or-nothing. A
    /// failure must leave none of the rows behind.
    async fn insert_bulk(&self, rows: &[AppendRequest]) -> Result<(), Self::Error>;

    /// Inserts one row as its own atomic write, never reopening a multi-row
    /// transaction. `Ok(false)` when the `(unit_name, transaction_id)` key
    /// already exists.
    async fn insert_one(&self, row: &AppendRequest) -> Result<bool, Self::Error>;

    async fn delete(&self, unit_name: &str, transaction_id: i64) -> Result<(), Self::Error>;

    /// All rows of a unit, ascending by transaction id.
    async fn get_list(&self, unit_name: &str) -> Result<Vec<AppendRequest>, Self::Error>;

    /// Returns whether a row was updated.
    async fn update_status(
        &self,
        unit_name: &str,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<bool, Self::Error>;
}

/// Blanket implementation making a [`TransactionBackend`] out of every
/// (smart) pointer to a [`TransactionBackend`], e.g. `Box<B>`, `Arc<B>`.
#[async_trait]
impl<E, B, T> TransactionBackend for T
where
    E: std::error::Error + Send + Sync + 'static,
    B: TransactionBackend<Error = E> + ?Sized,
    T: Deref<Target = B> + Send + Sync + 'static,
{
    type Error = E;

    /// Deref call to [`TransactionBackend::insert_bulk`].
    async fn insert_bulk(&self, rows: &[AppendRequest]) -> Result<(), Self::Error> {
        self.deref().insert_bulk(rows).await
    }

    /// Deref call to [`TransactionBackend::insert_one`].
    async fn insert_one(&self, row: &AppendRequest) -> Result<bool, Self::Error> {
        self.deref().insert_one(row).await
    }

    /// Deref call to [`TransactionBackend::delete`].
    async fn delete(&self, unit_name: &str, transaction_id: i64) -> Result<(), Self::Error> {
        self.deref().delete(unit_name, transaction_id).await
    }

    /// Deref call to [`TransactionBackend::get_list`].
    async fn get_list(&self, unit_name: &str) -> Result<Vec<AppendRequest>, Self::Error> {
        self.deref().get_list(unit_name).await
    }

    /// Deref call to [`TransactionBackend::update_status`].
    async fn update_status(
        &self,
        unit_name: &str,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<bool, Self::Error> {
        self.deref().update_status(unit_name, transaction_id, status).await
    }
}

/// Tuning for a [`TransactionStore`].
#[derive(Clone, Copy, Debug)]
pub struct TransactionStoreConfig {
    pub channel: ChannelConfig,
    /// Deadline for reads ([`TransactionStore::get_list`]).
    pub read_timeout: Duration,
    /// Deadline for row-level writes ([`TransactionStore::delete`] and
    /// [`TransactionStore::update`]); appends are only bounded by the channel
    /// capacity.
    pub write_timeout: Duration,
}

impl Default for TransactionStoreConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(3),
        }
    }
}

impl TransactionStoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

/// All possible failures of a [`TransactionStore`] call. A duplicate append
/// is not among them: it is the `Ok(false)` outcome.
#[derive(Debug, thiserror::Error)]
pub enum TransactionStoreError<E> {
    /// The append channel shut down before the item completed.
    #[error("append channel closed before completion")]
    ChannelClosed,
    /// A storage call exceeded its deadline. The store never retries; the
    /// caller decides.
    #[error("storage call exceeded the {0:?} deadline")]
    Elapsed(Duration),
    /// The storage backend failed.
    #[error(transparent)]
    Backend(E),
    /// Commit data could not be encoded to, or decoded from, its row form.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The coalescing front of a transactional append log.
///
/// Construction binds and activates the single batch consumer; dropping the
/// store drops its producer handle, which ends the consumer loop once the
/// queue drains.
pub struct TransactionStore<B>
where
    B: TransactionBackend,
{
    backend: Arc<B>,
    channel: CoalescingChannel<AppendRequest, Result<bool, B::Error>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<B> TransactionStore<B>
where
    B: TransactionBackend,
{
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, TransactionStoreConfig::default())
    }

    pub fn with_config(backend: B, config: TransactionStoreConfig) -> Self {
        let backend = Arc::new(backend);
        let channel = CoalescingChannel::new(config.channel);
        channel.bind_consumer(Arc::new(AppendConsumer {
            backend: Arc::clone(&backend),
        }));
        channel
            .activate_consumer()
            .expect("the consumer is bound above and the channel cannot be active yet");

        Self {
            backend,
            channel,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        }
    }

    /// Appends a commit to the unit's log and awaits its completion.
    ///
    /// `Ok(true)` means the row was persisted by this call; `Ok(false)` means
    /// `(unit_name, transaction_id)` was already appended by a prior attempt
    /// and the log is unchanged.
    pub async fn append<I>(
        &self,
        unit_name: &str,
        commit: &Commit<I>,
    ) -> Result<bool, TransactionStoreError<B::Error>>
    where
        I: Serialize,
    {
        let request = AppendRequest {
            unit_name: unit_name.to_owned(),
            transaction_id: commit.transaction_id,
            data: serde_json::to_string(&commit.data)?,
            status: commit.status,
        };

        let (item, done) = AsyncItem::new(request);
        self.channel
            .write(item)
            .await
            .map_err(|_| TransactionStoreError::ChannelClosed)?;

        match done.await {
            Ok(outcome) => outcome.map_err(TransactionStoreError::Backend),
            Err(_) => Err(TransactionStoreError::ChannelClosed),
        }
    }

    pub async fn delete(
        &self,
        unit_name: &str,
        transaction_id: i64,
    ) -> Result<(), TransactionStoreError<B::Error>> {
        timeout(self.write_timeout, self.backend.delete(unit_name, transaction_id))
            .await
            .map_err(|_| TransactionStoreError::Elapsed(self.write_timeout))?
            .map_err(TransactionStoreError::Backend)
    }

    /// All commits of a unit, with their data decoded back from the row form.
    pub async fn get_list<I>(
        &self,
        unit_name: &str,
    ) -> Result<Vec<Commit<I>>, TransactionStoreError<B::Error>>
    where
        I: DeserializeOwned,
    {
        let rows = timeout(self.read_timeout, self.backend.get_list(unit_name))
            .await
            .map_err(|_| TransactionStoreError::Elapsed(self.read_timeout))?
            .map_err(TransactionStoreError::Backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(Commit {
                    transaction_id: row.transaction_id,
                    data: serde_json::from_str(&row.data)?,
                    status: row.status,
                })
            })
            .collect()
    }

    /// Moves a commit to a new status. Returns whether the row existed.
    pub async fn update(
        &self,
        unit_name: &str,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<bool, TransactionStoreError<B::Error>> {
        timeout(
            self.write_timeout,
            self.backend.update_status(unit_name, transaction_id, status),
        )
        .await
        .map_err(|_| TransactionStoreError::Elapsed(self.write_timeout))?
        .map_err(TransactionStoreError::Backend)
    }
}

/// The single batch consumer: bulk insert first, per-row fallback on abort.
struct AppendConsumer<B> {
    backend: Arc<B>,
}

#[async_trait]
impl<B> BatchConsumer<AppendRequest, Result<bool, B::Error>> for AppendConsumer<B>
where
    B: TransactionBackend,
{
    async fn consume(&self, batch: Vec<AsyncItem<AppendRequest, Result<bool, B::Error>>>) {
        let rows: Vec<AppendRequest> = batch.iter().map(|item| item.input().clone()).collect();

        match self.backend.insert_bulk(&rows).await {
            Ok(()) => {
                for item in batch {
                    item.complete(Ok(true));
                }
            }
            Err(error) => {
                tracing::warn!(
                    rows = rows.len(),
                    error = ?error,
                    "bulk append aborted, falling back to single-row inserts"
                );
                // Original order is kept; each row is its own atomic write
                // and completes independently.
                for item in batch {
                    let outcome = self.backend.insert_one(item.input()).await;
                    item.complete(outcome);
                }
            }
        }
    }
}
