use futures::TryStreamExt;
use tokio::sync::Mutex;

use crate::config::FollowerConfig;
use crate::event::{MessageInfo, SequencedEvent};
use crate::follower::Follower;
use crate::registry::TypeRegistry;
use crate::state::FollowerState;
use crate::store::{EventStore, StateStore};
use crate::types::EventVersion;

/// All possible failures of a follower activation.
///
/// `S` is the shared storage error of the activation's stores, `H` the user
/// handler error. Any `Err` out of [`FollowerActivation::activate`] aborts the
/// activation; errors out of [`FollowerActivation::tell`] leave the activation
/// alive, and a later delivery may retry.
#[derive(Debug, thiserror::Error)]
pub enum FollowerError<S, H> {
    /// The incoming event version still exceeds the state version after a gap
    /// fill; the log does not contain the missing history yet.
    #[error("event version {incoming} does not match state version {current}")]
    VersionMismatch {
        incoming: EventVersion,
        current: EventVersion,
    },
    /// An underlying store call failed.
    #[error(transparent)]
    Store(S),
    /// A user hook failed.
    #[error(transparent)]
    Handler(H),
    /// An event envelope or payload could not be decoded.
    #[error(transparent)]
    Envelope(#[from] serde_json::Error),
}

/// The stores a follower activation works against, passed in explicitly by
/// whoever hosts the activation. Both stores must share one error type.
pub struct Dependencies<ES, SS> {
    pub event_store: ES,
    pub state_store: SS,
}

impl<ES, SS> Dependencies<ES, SS> {
    pub fn new(event_store: ES, state_store: SS) -> Self {
        Self {
            event_store,
            state_store,
        }
    }
}

/// One live activation of a [`Follower`] key.
///
/// The host platform guarantees a single activation per key and serialized
/// mailbox delivery, so this type holds the materialized state directly and
/// takes `&mut self` on the delivery path. The lifecycle is:
///
/// ```text
/// activate() ── snapshot read ── full replay (if fully_active) ──▶ ready
/// ready ── tell / tell_envelope ──▶ ready            (gap fill as needed)
/// ready ── deactivate ──▶ gone                       (snapshot if due)
/// ```
pub struct FollowerActivation<F, ES, SS>
where
    F: Follower,
    ES: EventStore<Follower = F>,
    SS: StateStore<Follower = F, Error = ES::Error>,
{
    follower: F,
    config: FollowerConfig,
    event_store: ES,
    state_store: SS,
    state: FollowerState<F::Key, F::State>,
    snapshot_version: EventVersion,
    no_snapshot: bool,
}

impl<F, ES, SS> FollowerActivation<F, ES, SS>
where
    F: Follower,
    ES: EventStore<Follower = F>,
    SS: StateStore<Follower = F, Error = ES::Error>,
{
    /// Brings a follower key to life: loads the latest snapshot (or starts
    /// from a fresh state at version 0), then, when
    /// [`FollowerConfig::fully_active`] is set, replays the whole log past the
    /// snapshot before returning.
    ///
    /// Any failure aborts the activation and must be propagated to the host.
    #[tracing::instrument(skip_all, fields(follower = F::NAME, key = %key))]
    pub async fn activate(
        follower: F,
        key: F::Key,
        config: FollowerConfig,
        dependencies: Dependencies<ES, SS>,
    ) -> Result<Self, FollowerError<ES::Error, F::Error>> {
        let Dependencies {
            event_store,
            state_store,
        } = dependencies;

        let (state, no_snapshot) = match state_store.get(&key).await.map_err(FollowerError::Store)? {
            Some(state) => (state, false),
            None => (FollowerState::new(key), true),
        };
        let snapshot_version = state.version;

        let mut activation = Self {
            follower,
            config,
            event_store,
            state_store,
            state,
            snapshot_version,
            no_snapshot,
        };

        if activation.config.fully_active {
            activation.full_active().await?;
        }

        Ok(activation)
    }

    /// The materialized state, owned by this activation alone.
    pub fn state(&self) -> &FollowerState<F::Key, F::State> {
        &self.state
    }

    /// The version the latest persisted snapshot was taken at.
    pub const fn snapshot_version(&self) -> EventVersion {
        self.snapshot_version
    }

    /// Accepts a serialized envelope from the mailbox. Envelopes whose
    /// `type_name` resolves to this follower's event type are decoded and
    /// routed to [`Self::tell`]; anything else is logged and dropped.
    pub async fn tell_envelope(&mut self, bytes: &[u8]) -> Result<(), FollowerError<ES::Error, F::Error>> {
        let info: MessageInfo = serde_json::from_slice(bytes)?;

        if TypeRegistry::global().is::<F::Event>(&info.type_name) {
            let event: SequencedEvent<F::Event> = serde_json::from_slice(&info.bytes)?;
            self.tell(event).await
        } else {
            tracing::debug!(
                follower = F::NAME,
                key = %self.state.key,
                type_name = %info.type_name,
                "dropping non-event message"
            );
            Ok(())
        }
    }

    /// Applies one delivered event, filling any gap from the event store
    /// first.
    ///
    /// With `v` the incoming version and `V` the state version:
    /// - `v == V + 1` applies directly;
    /// - `v > V + 1` replays the log range `(V, v]` — which covers the
    ///   incoming event itself once the log contains it — and fails with
    ///   [`FollowerError::VersionMismatch`] if the log stops short of `v`;
    /// - `v <= V` is stale and absorbed as a no-op.
    ///
    /// An event is applied at most once: either directly or as a member of
    /// the replayed range, never both.
    #[tracing::instrument(skip_all, fields(follower = F::NAME, key = %self.state.key, version = event.base.version))]
    pub async fn tell(
        &mut self,
        event: SequencedEvent<F::Event>,
    ) -> Result<(), FollowerError<ES::Error, F::Error>> {
        match self.deliver(&event).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!(
                    error = ?error,
                    payload = %serde_json::to_string(&event.payload)
                        .unwrap_or_else(|_| String::from("<unserializable>")),
                    "failed to deliver event"
                );
                Err(error)
            }
        }
    }

    async fn deliver(
        &mut self,
        event: &SequencedEvent<F::Event>,
    ) -> Result<(), FollowerError<ES::Error, F::Error>> {
        let incoming = event.base.version;

        if incoming == self.state.version + 1 {
            self.apply(event).await?;
        } else if incoming > self.state.version {
            let gap = self
                .event_store
                .get_list(&self.state.key, self.state.version, incoming)
                .await
                .map_err(FollowerError::Store)?;

            for stored in &gap {
                self.apply(stored).await?;
            }

            if incoming > self.state.version {
                return Err(FollowerError::VersionMismatch {
                    incoming,
                    current: self.state.version,
                });
            }
        } else {
            // The log already contains an equal-or-newer history.
            tracing::debug!(
                follower = F::NAME,
                key = %self.state.key,
                incoming,
                current = self.state.version,
                "absorbing stale event"
            );
        }

        self.save_snapshot(false).await
    }

    /// Replays the whole log past the snapshot, one page at a time,
    /// snapshotting after each page.
    async fn full_active(&mut self) -> Result<(), FollowerError<ES::Error, F::Error>> {
        loop {
            let after = self.state.version;
            let page = self
                .event_store
                .get_list(&self.state.key, after, after + self.config.events_per_read)
                .await
                .map_err(FollowerError::Store)?;
            let fetched = page.len() as EventVersion;

            if self.config.concurrent_events {
                self.apply_unordered(&page).await?;
            } else {
                for stored in &page {
                    self.apply(stored).await?;
                }
            }

            self.save_snapshot(false).await?;

            if fetched < self.config.events_per_read {
                return Ok(());
            }
        }
    }

    async fn apply(
        &mut self,
        event: &SequencedEvent<F::Event>,
    ) -> Result<(), FollowerError<ES::Error, F::Error>> {
        self.state.doing_version = self.state.version + 1;

        self.follower
            .on_event_delivered(&mut self.state.inner, event)
            .await
            .map_err(FollowerError::Handler)?;

        self.state.version = event.base.version;
        self.state.doing_version = event.base.version;
        Ok(())
    }

    /// Applies one page with the events unordered relative to each other. The
    /// state cell is locked per event, so the user hook never sees a torn
    /// state, but it must be commutative within the page. The version
    /// advances to the page's last event only after the whole page completed.
    async fn apply_unordered(
        &mut self,
        page: &[SequencedEvent<F::Event>],
    ) -> Result<(), FollowerError<ES::Error, F::Error>> {
        let follower = &self.follower;
        let cell = Mutex::new(&mut self.state.inner);

        futures::stream::iter(page.iter().map(Ok::<_, F::Error>))
            .try_for_each_concurrent(None, |event| {
                let cell = &cell;
                async move {
                    let mut guard = cell.lock().await;
                    follower.on_event_delivered(&mut **guard, event).await
                }
            })
            .await
            .map_err(FollowerError::Handler)?;

        if let Some(last) = page.last() {
            self.state.version = last.base.version;
            self.state.doing_version = last.base.version;
        }
        Ok(())
    }

    /// Persists the snapshot when due.
    ///
    /// A no-op unless snapshots are enabled and either `force` is set or
    /// `version - snapshot_version` crossed
    /// [`FollowerConfig::snapshot_version_interval`]. The first write for a
    /// key is an insert, every later one an update. Store failures are logged
    /// and re-raised; retrying is the host's decision.
    pub async fn save_snapshot(&mut self, force: bool) -> Result<(), FollowerError<ES::Error, F::Error>> {
        if !self.config.save_snapshot {
            return Ok(());
        }
        if !force && self.state.version - self.snapshot_version < self.config.snapshot_version_interval {
            return Ok(());
        }

        self.follower
            .on_save_snapshot(&mut self.state.inner)
            .await
            .map_err(FollowerError::Handler)?;

        let written = if self.no_snapshot {
            self.state_store.insert(&self.state).await
        } else {
            self.state_store.update(&self.state).await
        };

        if let Err(error) = written {
            tracing::error!(
                follower = F::NAME,
                key = %self.state.key,
                version = self.state.version,
                error = ?error,
                "failed to persist snapshot"
            );
            return Err(FollowerError::Store(error));
        }

        self.no_snapshot = false;
        self.snapshot_version = self.state.version;

        self.follower
            .on_saved_snapshot(&self.state.inner)
            .await
            .map_err(FollowerError::Handler)
    }

    /// Invoked by the host right before the activation is discarded. Persists
    /// a final snapshot only when enough versions accumulated since the last
    /// one ([`FollowerConfig::snapshot_min_version_interval`]).
    #[tracing::instrument(skip_all, fields(follower = F::NAME, key = %self.state.key))]
    pub async fn deactivate(&mut self) -> Result<(), FollowerError<ES::Error, F::Error>> {
        if self.state.version - self.snapshot_version >= self.config.snapshot_min_version_interval {
            self.save_snapshot(true).await
        } else {
            Ok(())
        }
    }
}
