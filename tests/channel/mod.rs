use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use folrs::{AsyncItem, BatchConsumer, ChannelConfig, ChannelError, CoalescingChannel};

/// Doubles every input and records the batch sizes it was handed.
#[derive(Default)]
struct DoublingConsumer {
    batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl BatchConsumer<i64, i64> for DoublingConsumer {
    async fn consume(&self, batch: Vec<AsyncItem<i64, i64>>) {
        self.batch_sizes.lock().unwrap().push(batch.len());
        for item in batch {
            let doubled = item.input() * 2;
            item.complete(doubled);
        }
    }
}

#[tokio::test]
async fn queued_items_drain_as_one_batch() {
    let channel: CoalescingChannel<i64, i64> = CoalescingChannel::new(ChannelConfig::default());
    let consumer = Arc::new(DoublingConsumer::default());
    channel.bind_consumer(consumer.clone());

    // Everything enqueued before the consumer starts lands in its first drain.
    let (item, first) = AsyncItem::new(1);
    channel.write(item).await.unwrap();
    let (item, second) = AsyncItem::new(2);
    channel.write(item).await.unwrap();
    let (item, third) = AsyncItem::new(3);
    channel.write(item).await.unwrap();

    channel.activate_consumer().unwrap();

    assert_eq!(first.await.unwrap(), 2);
    assert_eq!(second.await.unwrap(), 4);
    assert_eq!(third.await.unwrap(), 6);
    assert_eq!(consumer.batch_sizes.lock().unwrap().as_slice(), &[3]);
}

#[tokio::test]
async fn batches_respect_the_max_batch_bound() {
    let channel: CoalescingChannel<i64, i64> =
        CoalescingChannel::new(ChannelConfig::default().with_max_batch(2));
    let consumer = Arc::new(DoublingConsumer::default());
    channel.bind_consumer(consumer.clone());

    let mut completions = Vec::new();
    for input in 1..=3 {
        let (item, done) = AsyncItem::new(input);
        channel.write(item).await.unwrap();
        completions.push(done);
    }

    channel.activate_consumer().unwrap();

    for (position, done) in completions.into_iter().enumerate() {
        assert_eq!(done.await.unwrap(), (position as i64 + 1) * 2);
    }
    assert_eq!(consumer.batch_sizes.lock().unwrap().as_slice(), &[2, 1]);
}

#[tokio::test]
async fn items_written_after_activation_complete_too() {
    let channel: CoalescingChannel<i64, i64> = CoalescingChannel::new(ChannelConfig::default());
    let consumer = Arc::new(DoublingConsumer::default());
    channel.bind_consumer(consumer);
    channel.activate_consumer().unwrap();

    let (item, done) = AsyncItem::new(21);
    channel.write(item).await.unwrap();

    assert_eq!(done.await.unwrap(), 42);
}

#[tokio::test]
async fn activation_requires_a_bound_consumer_and_happens_once() {
    let channel: CoalescingChannel<i64, i64> = CoalescingChannel::new(ChannelConfig::default());

    assert_eq!(channel.activate_consumer(), Err(ChannelError::ConsumerMissing));

    channel.bind_consumer(Arc::new(DoublingConsumer::default()));
    assert_eq!(channel.activate_consumer(), Ok(()));
    assert_eq!(channel.activate_consumer(), Err(ChannelError::AlreadyActive));
}
