use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::state::FollowerState;
use crate::types::EventVersion;

/// Snapshot representation on the state store
#[derive(sqlx::FromRow, Debug)]
pub struct DbState {
    pub key: String,
    pub payload: Value,
    pub version: EventVersion,
    pub doing_version: EventVersion,
}

impl DbState {
    /// The caller already holds the typed key it queried with; the row only
    /// contributes versions and payload.
    pub fn try_into_follower_state<K, S>(self, key: K) -> serde_json::Result<FollowerState<K, S>>
    where
        S: DeserializeOwned,
    {
        Ok(FollowerState {
            key,
            version: self.version,
            doing_version: self.doing_version,
            inner: serde_json::from_value(self.payload)?,
        })
    }
}
