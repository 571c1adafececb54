use serde::{Deserialize, Serialize};

use crate::types::EventVersion;

/// The materialized state of one follower key.
///
/// `version` is the highest event version applied so far; `doing_version` is
/// bumped to `version + 1` right before an event is handed to the user's
/// handler and folded back once the application committed, so it is always in
/// `{version, version + 1}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FollowerState<K, S> {
    pub key: K,
    pub version: EventVersion,
    pub doing_version: EventVersion,
    pub inner: S,
}

impl<K, S> FollowerState<K, S>
where
    S: Default,
{
    /// Creates a fresh state for a key that has no history yet.
    #[must_use]
    pub fn new(key: K) -> Self {
        Self {
            key,
            version: 0,
            doing_version: 0,
            inner: S::default(),
        }
    }
}

impl<K, S> FollowerState<K, S> {
    pub const fn key(&self) -> &K {
        &self.key
    }

    pub const fn version(&self) -> EventVersion {
        self.version
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}
