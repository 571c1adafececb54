use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The version of an event within its key, and of the state that applied it.
///
/// Versions are strictly monotonic per key and start at 1; version 0 means
/// "no events applied yet". The width matches the storage column (BIGINT).
pub type EventVersion = i64;

/// The ordering metadata every stored event carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBase {
    /// Position of the event within its key's history.
    pub version: EventVersion,
    /// Unix-millisecond timestamp of when the event was recorded.
    pub timestamp: i64,
}

impl EventBase {
    /// Creates a new instance stamped with the current wall clock.
    #[must_use]
    pub fn new(version: EventVersion) -> Self {
        Self {
            version,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// A `SequencedEvent` contains the payload (the original event) alongside its
/// ordering metadata. The follower machinery only ever reads [`EventBase`];
/// the payload is opaque until it reaches the user's handler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequencedEvent<E> {
    pub base: EventBase,
    pub payload: E,
}

impl<E> SequencedEvent<E> {
    pub fn new(base: EventBase, payload: E) -> Self {
        Self { base, payload }
    }

    /// Returns the version of the event, within its specific key.
    pub const fn version(&self) -> EventVersion {
        self.base.version
    }

    /// Returns the original, emitted, event.
    pub const fn payload(&self) -> &E {
        &self.payload
    }
}

/// Outer wire framing for messages delivered to a follower's mailbox.
///
/// `type_name` resolves through the [`crate::TypeRegistry`]; `bytes` decodes
/// under the resolved type. Senders that share the mailbox with non-event
/// traffic rely on the name to let followers skip what isn't theirs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageInfo {
    pub type_name: String,
    pub bytes: Vec<u8>,
}

impl MessageInfo {
    /// Frames an event payload under the given registered type name.
    pub fn frame<E: Serialize>(
        type_name: impl Into<String>,
        event: &SequencedEvent<E>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            type_name: type_name.into(),
            bytes: serde_json::to_vec(event)?,
        })
    }

    /// Serializes the whole envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
