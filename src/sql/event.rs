use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::event::{EventBase, SequencedEvent};
use crate::types::EventVersion;

/// Event representation on the event store
#[derive(sqlx::FromRow, Debug)]
pub struct DbEvent {
    pub id: Uuid,
    pub key: String,
    pub payload: Value,
    pub occurred_ms: i64,
    pub version: EventVersion,
}

impl DbEvent {
    pub fn try_into_sequenced_event<E>(self) -> serde_json::Result<SequencedEvent<E>>
    where
        E: DeserializeOwned,
    {
        Ok(SequencedEvent {
            base: EventBase {
                version: self.version,
                timestamp: self.occurred_ms,
            },
            payload: serde_json::from_value(self.payload)?,
        })
    }
}
