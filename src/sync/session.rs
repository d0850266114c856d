use time::OffsetDateTime;

/// State of one bulk channel-synchronization run.
///
/// Progress is monotonic in time, but [`SyncState::Failed`] is reachable
/// from every state: failures must always be observable regardless of how
/// far the run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Processing,
    Synced,
    Failed,
}

/// Bookkeeping record for one channel-synchronization run.
///
/// Created before orchestration begins; single-writer per run, persisted
/// through the store on each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSyncSession {
    pub id: i64,
    pub channel_id: i64,
    pub external_channel_url: String,
    pub state: SyncState,
    pub last_sync_at: Option<OffsetDateTime>,
}

impl ChannelSyncSession {
    pub fn new(id: i64, channel_id: i64, external_channel_url: String) -> Self {
        Self {
            id,
            channel_id,
            external_channel_url,
            state: SyncState::Pending,
            last_sync_at: None,
        }
    }

    /// Mark the run as started and stamp the sync time
    pub fn start(&mut self, now: OffsetDateTime) {
        self.state = SyncState::Processing;
        self.last_sync_at = Some(now);
    }

    /// Mark the run as completed: zero or more jobs were queued without a
    /// fatal error.
    pub fn complete(&mut self) {
        self.state = SyncState::Synced;
    }

    /// Mark the run as failed. Valid from every state.
    pub fn fail(&mut self) {
        self.state = SyncState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChannelSyncSession {
        ChannelSyncSession::new(1, 7, "https://example.com/c/chan".to_string())
    }

    #[test]
    fn nominal_lifecycle_ends_synced() {
        let mut session = session();
        assert_eq!(session.state, SyncState::Pending);
        assert_eq!(session.last_sync_at, None);

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        session.start(now);
        assert_eq!(session.state, SyncState::Processing);
        assert_eq!(session.last_sync_at, Some(now));

        session.complete();
        assert_eq!(session.state, SyncState::Synced);
    }

    #[test]
    fn failed_is_reachable_from_every_state() {
        let mut fresh = session();
        fresh.fail();
        assert_eq!(fresh.state, SyncState::Failed);

        let mut processing = session();
        processing.start(OffsetDateTime::from_unix_timestamp(0).unwrap());
        processing.fail();
        assert_eq!(processing.state, SyncState::Failed);

        let mut synced = session();
        synced.complete();
        synced.fail();
        assert_eq!(synced.state, SyncState::Failed);
    }
}
