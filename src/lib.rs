//! This crate gives you an opinionated way of implementing the read side
//! (followers) of CQRS/event sourcing on top of a virtual-actor platform.
//!
//! A [`Follower`] is a per-key read model. Each activation materializes its
//! state once, by combining the latest snapshot read from a [`StateStore`]
//! with the events replayed from an [`EventStore`], and then keeps the state
//! current by applying delivered events in version order. State is
//! periodically snapshotted so that the next activation does not pay for a
//! full replay.
//!
//! Orthogonally, [`store::transaction::TransactionStore`] funnels per-unit
//! commits from many concurrent producers through a bounded
//! [`CoalescingChannel`] into bulk transactional writes, degrading to per-row
//! inserts (with duplicate keys tolerated) when the bulk transaction aborts.
//!
//! Without the `postgres` feature enabled, this crate just exposes the traits
//! needed to plug in your own storage; with it, pre-made `sqlx`-based
//! implementations are available under [`postgres`].

pub use crate::activation::{Dependencies, FollowerActivation, FollowerError};
pub use crate::channel::{AsyncItem, BatchConsumer, ChannelConfig, ChannelError, CoalescingChannel};
pub use crate::config::FollowerConfig;
pub use crate::event::{EventBase, MessageInfo, SequencedEvent};
pub use crate::follower::Follower;
pub use crate::registry::TypeRegistry;
pub use crate::state::FollowerState;
pub use crate::store::{EventStore, StateStore};

mod activation;
mod channel;
mod config;
mod event;
mod follower;
mod registry;
mod state;
pub mod store;

#[cfg(feature = "postgres")]
mod sql;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! Provides `sqlx`-based implementations of the storage contracts.
    pub use crate::store::postgres::{PgEventStore, PgStateStore, PgStoreError, PgTransactionBackend};
}

pub mod error {
    //! All possible errors returned by this crate
    pub use serde_json::Error as JsonError;
    #[cfg(feature = "postgres")]
    pub use sqlx::Error as SqlxError;

    pub use crate::activation::FollowerError;
    pub use crate::channel::ChannelError;
    pub use crate::store::transaction::{TransactionStoreError, UnknownStatus};
}

pub mod types {
    //! Provides custom types.
    pub use crate::event::EventVersion;
}
