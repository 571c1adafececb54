use crate::types::EventVersion;

/// Tuning knobs for one follower type.
///
/// The defaults keep a follower fully durable: every applied event crosses
/// the snapshot interval, so scenario-style tests observe a write per apply.
/// Production followers usually raise `snapshot_version_interval` well above 1
/// and turn `fully_active` on when reads must never see a stale state.
#[derive(Clone, Debug)]
pub struct FollowerConfig {
    /// If false, snapshots are never written and every activation rebuilds
    /// from the full log.
    pub save_snapshot: bool,
    /// After applying events, persist once `version - snapshot_version`
    /// reaches this.
    pub snapshot_version_interval: EventVersion,
    /// On deactivation, persist only if `version - snapshot_version` reaches
    /// this.
    pub snapshot_min_version_interval: EventVersion,
    /// Page size for event-log scans.
    pub events_per_read: EventVersion,
    /// Replay the whole log past the snapshot during activation instead of
    /// deferring to the first delivery.
    pub fully_active: bool,
    /// Apply the events of one replay page unordered. Requires a commutative
    /// [`crate::Follower::on_event_delivered`].
    pub concurrent_events: bool,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            save_snapshot: true,
            snapshot_version_interval: 1,
            snapshot_min_version_interval: 1,
            events_per_read: 1000,
            fully_active: false,
            concurrent_events: false,
        }
    }
}

impl FollowerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn without_snapshots(mut self) -> Self {
        self.save_snapshot = false;
        self
    }

    #[must_use]
    pub fn with_snapshot_version_interval(mut self, interval: EventVersion) -> Self {
        self.snapshot_version_interval = interval;
        self
    }

    #[must_use]
    pub fn with_snapshot_min_version_interval(mut self, interval: EventVersion) -> Self {
        self.snapshot_min_version_interval = interval;
        self
    }

    #[must_use]
    pub fn with_events_per_read(mut self, events_per_read: EventVersion) -> Self {
        self.events_per_read = events_per_read;
        self
    }

    #[must_use]
    pub fn fully_active(mut self) -> Self {
        self.fully_active = true;
        self
    }

    #[must_use]
    pub fn with_concurrent_events(mut self) -> Self {
        self.concurrent_events = true;
        self
    }
}
