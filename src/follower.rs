use std::fmt::Display;
use std::hash::Hash;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::event::SequencedEvent;

/// A `Follower` is a per-key read model materialized from an event log.
///
/// Implementations supply the event-folding logic; the runtime
/// ([`crate::FollowerActivation`]) owns the lifecycle — snapshot load, gap
/// replay, version bookkeeping and snapshot persistence. One instance is
/// created per activation and dropped on deactivation.
///
/// Followers are linked to their events and snapshots using `NAME` and their
/// key. Be very careful when changing `NAME`, as doing so will break the link
/// between all followers of this type and their history!
#[async_trait]
pub trait Follower: Send + Sync {
    const NAME: &'static str;

    /// Identifies one instance of this follower type. Opaque to the runtime
    /// beyond equality, hashing and its string form (used for storage keys
    /// and tracing fields).
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;
    type Event: Serialize + DeserializeOwned + Send + Sync + 'static;
    type State: Default + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Folds one event into the state.
    ///
    /// In the default mode events arrive here in strictly ascending version
    /// order. With [`crate::FollowerConfig::concurrent_events`] enabled,
    /// events of one replay page arrive unordered, so the implementation must
    /// be commutative within a page.
    async fn on_event_delivered(
        &self,
        state: &mut Self::State,
        event: &SequencedEvent<Self::Event>,
    ) -> Result<(), Self::Error>;

    /// Invoked right before a snapshot write. The state may still be adjusted
    /// here (e.g. to prune caches that should not be persisted).
    async fn on_save_snapshot(&self, _state: &mut Self::State) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Invoked after a snapshot write succeeded.
    async fn on_saved_snapshot(&self, _state: &Self::State) -> Result<(), Self::Error> {
        Ok(())
    }
}
