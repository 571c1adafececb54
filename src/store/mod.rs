use std::ops::Deref;

use async_trait::async_trait;

use crate::event::SequencedEvent;
use crate::follower::Follower;
use crate::state::FollowerState;
use crate::types::EventVersion;

pub mod transaction;

#[cfg(feature = "postgres")]
pub mod postgres;

/// An `EventStore` is responsible for loading the slice of a key's history
/// that a follower is missing. Followers never write events; producers on the
/// write side own the log.
#[async_trait]
pub trait EventStore: Send + Sync {
    type Follower: Follower;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the events with version in `(after, up_to]`, ascending by
    /// version. Returns fewer than `up_to - after` items when the log ends
    /// early.
    async fn get_list(
        &self,
        key: &<Self::Follower as Follower>::Key,
        after: EventVersion,
        up_to: EventVersion,
    ) -> Result<Vec<SequencedEvent<<Self::Follower as Follower>::Event>>, Self::Error>;
}

/// Blanket implementation making an [`EventStore`] out of every (smart)
/// pointer to an [`EventStore`], e.g. `&Store`, `Box<Store>`, `Arc<Store>`.
#[async_trait]
impl<F, E, S, T> EventStore for T
where
    F: Follower,
    E: std::error::Error + Send + Sync + 'static,
    S: EventStore<Follower = F, Error = E> + ?Sized,
    T: Deref<Target = S> + Send + Sync,
{
    type Follower = F;
    type Error = E;

    /// Deref call to [`EventStore::get_list`].
    async fn get_list(
        &self,
        key: &F::Key,
        after: EventVersion,
        up_to: EventVersion,
    ) -> Result<Vec<SequencedEvent<F::Event>>, Self::Error> {
        self.deref().get_list(key, after, up_to).await
    }
}

/// A `StateStore` persists follower snapshots so that reactivation combines
/// the latest snapshot with a partial replay instead of the full log.
#[async_trait]
pub trait StateStore: Send + Sync {
    type Follower: Follower;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the latest snapshot for the key, if one was ever written.
    async fn get(
        &self,
        key: &<Self::Follower as Follower>::Key,
    ) -> Result<
        Option<FollowerState<<Self::Follower as Follower>::Key, <Self::Follower as Follower>::State>>,
        Self::Error,
    >;

    /// Writes the first snapshot for a key. Errors on a duplicate key.
    async fn insert(
        &self,
        state: &FollowerState<<Self::Follower as Follower>::Key, <Self::Follower as Follower>::State>,
    ) -> Result<(), Self::Error>;

    /// Overwrites the snapshot for a key, last writer wins. The caller is
    /// responsible for only ever writing monotonically increasing versions.
    async fn update(
        &self,
        state: &FollowerState<<Self::Follower as Follower>::Key, <Self::Follower as Follower>::State>,
    ) -> Result<(), Self::Error>;

    /// Removes the snapshot for a key, if present.
    async fn delete(&self, key: &<Self::Follower as Follower>::Key) -> Result<(), Self::Error>;
}

/// Blanket implementation making a [`StateStore`] out of every (smart)
/// pointer to a [`StateStore`].
#[async_trait]
impl<F, E, S, T> StateStore for T
where
    F: Follower,
    E: std::error::Error + Send + Sync + 'static,
    S: StateStore<Follower = F, Error = E> + ?Sized,
    T: Deref<Target = S> + Send + Sync,
{
    type Follower = F;
    type Error = E;

    /// Deref call to [`StateStore::get`].
    async fn get(&self, key: &F::Key) -> Result<Option<FollowerState<F::Key, F::State>>, Self::Error> {
        self.deref().get(key).await
    }

    /// Deref call to [`StateStore::insert`].
    async fn insert(&self, state: &FollowerState<F::Key, F::State>) -> Result<(), Self::Error> {
        self.deref().insert(state).await
    }

    /// Deref call to [`StateStore::update`].
    async fn update(&self, state: &FollowerState<F::Key, F::State>) -> Result<(), Self::Error> {
        self.deref().update(state).await
    }

    /// Deref call to [`StateStore::delete`].
    async fn delete(&self, key: &F::Key) -> Result<(), Self::Error> {
        self.deref().delete(key).await
    }
}
