use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Bounds for a [`CoalescingChannel`].
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    /// Queue capacity; producers suspend on [`CoalescingChannel::write`]
    /// while the queue is full.
    pub capacity: usize,
    /// Upper bound on how many items one consumer invocation receives.
    pub max_batch: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_batch: 256,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }
}

/// A queued work item carrying its own one-shot completion.
///
/// The producer keeps the receiver returned by [`AsyncItem::new`]; whoever
/// consumes the item resolves it with [`AsyncItem::complete`]. Completions
/// are independent: one slow or failed item never holds up the others in its
/// batch.
pub struct AsyncItem<In, Out> {
    input: In,
    completion: oneshot::Sender<Out>,
}

impl<In, Out> AsyncItem<In, Out> {
    pub fn new(input: In) -> (Self, oneshot::Receiver<Out>) {
        let (completion, done) = oneshot::channel();
        (Self { input, completion }, done)
    }

    pub fn input(&self) -> &In {
        &self.input
    }

    /// Resolves the producer's future. A dropped receiver means the producer
    /// gave up waiting; the value is discarded.
    pub fn complete(self, value: Out) {
        let _ = self.completion.send(value);
    }
}

/// Consumes drained batches of a [`CoalescingChannel`]. The consumer owns the
/// completion of every item it is handed.
#[async_trait]
pub trait BatchConsumer<In, Out>: Send + Sync {
    async fn consume(&self, batch: Vec<AsyncItem<In, Out>>);
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The consumer loop ended and the queue no longer accepts items.
    #[error("channel is closed")]
    Closed,
    /// [`CoalescingChannel::activate_consumer`] was called before
    /// [`CoalescingChannel::bind_consumer`].
    #[error("no batch consumer bound")]
    ConsumerMissing,
    /// The single consumer loop is already running.
    #[error("consumer is already active")]
    AlreadyActive,
}

/// A bounded multi-producer single-consumer queue that hands the consumer
/// whatever is ready, as one batch.
///
/// Producers [`write`](Self::write) items and suspend only while the queue is
/// full; the consumer loop blocks for the first item, drains everything else
/// that is immediately ready (up to [`ChannelConfig::max_batch`]) and invokes
/// the bound [`BatchConsumer`]. Exactly one consumer runs; the loop ends when
/// every producer handle is gone.
pub struct CoalescingChannel<In, Out> {
    tx: mpsc::Sender<AsyncItem<In, Out>>,
    max_batch: usize,
    binding: Mutex<Binding<In, Out>>,
}

struct Binding<In, Out> {
    rx: Option<mpsc::Receiver<AsyncItem<In, Out>>>,
    consumer: Option<Arc<dyn BatchConsumer<In, Out>>>,
}

impl<In, Out> CoalescingChannel<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity);
        Self {
            tx,
            max_batch: config.max_batch,
            binding: Mutex::new(Binding {
                rx: Some(rx),
                consumer: None,
            }),
        }
    }

    /// Enqueues an item, suspending while the queue is full. Returns once the
    /// item is enqueued, not once it is consumed; await the item's completion
    /// receiver for the outcome.
    pub async fn write(&self, item: AsyncItem<In, Out>) -> Result<(), ChannelError> {
        self.tx.send(item).await.map_err(|_| ChannelError::Closed)
    }

    /// Registers the batch consumer. Rebinding is allowed up until
    /// [`Self::activate_consumer`].
    pub fn bind_consumer(&self, consumer: Arc<dyn BatchConsumer<In, Out>>) {
        self.binding
            .lock()
            .expect("channel binding lock poisoned")
            .consumer = Some(consumer);
    }

    /// Starts the single consumer loop on the current runtime.
    pub fn activate_consumer(&self) -> Result<(), ChannelError> {
        let mut binding = self.binding.lock().expect("channel binding lock poisoned");
        let consumer = binding
            .consumer
            .clone()
            .ok_or(ChannelError::ConsumerMissing)?;
        let rx = binding.rx.take().ok_or(ChannelError::AlreadyActive)?;
        drop(binding);

        tokio::spawn(consume_loop(rx, consumer, self.max_batch));
        Ok(())
    }
}

async fn consume_loop<In, Out>(
    mut rx: mpsc::Receiver<AsyncItem<In, Out>>,
    consumer: Arc<dyn BatchConsumer<In, Out>>,
    max_batch: usize,
) where
    In: Send,
    Out: Send,
{
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < max_batch {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        tracing::trace!(batch = batch.len(), "draining coalesced batch");
        consumer.consume(batch).await;
    }
}
