mod sqlite;

pub use sqlite::Sqlite;

use crate::{result::Result, sync::ChannelSyncSession};

/// A local channel videos get imported into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub actor_id: i64,
    pub name: String,
}

/// The user acting on behalf of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Persistence collaborator for channels, imports, and sync sessions.
///
/// Sessions are saved with simple optimistic save-on-transition; mutual
/// exclusion of concurrent syncs of the same channel is the caller's
/// responsibility.
pub trait ImportStore {
    /// Fetch the channel with this name, creating it (and its owning
    /// user) on first use.
    fn ensure_channel(&self, name: &str) -> Result<Channel>;

    /// Resolve the user acting for the channel with this actor id
    fn load_user_by_channel_actor(&self, actor_id: i64) -> Result<User>;

    /// Idempotency guard against re-importing a URL into a channel
    fn url_already_imported(&self, channel_id: i64, url: &str) -> Result<bool>;

    /// Record that a URL has been imported into a channel
    fn record_import(&self, channel_id: i64, url: &str) -> Result<()>;

    /// Create the bookkeeping record for one synchronization run
    fn create_session(&self, channel_id: i64, external_url: &str) -> Result<ChannelSyncSession>;

    fn load_session(&self, id: i64) -> Result<ChannelSyncSession>;

    /// Persist the session after a state transition
    fn save_session(&self, session: &ChannelSyncSession) -> Result<()>;
}
