mod job;
mod session;

pub use job::{ChannelJobQueue, FinalizeJob, ImportJob, JobGraph, JobQueue, VideoPrivacy};
pub use session::{ChannelSyncSession, SyncState};

use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::{
    database::{Channel, ImportStore},
    normalize,
    outside::StreamExtractor,
    playlist,
    result::{Error, Result},
    types::PlaylistEntry,
};

/// Options for one synchronization run
#[derive(Debug, Clone)]
pub struct SyncOptions<'a> {
    /// Format chain used for single-item detail fetches
    pub format: &'a str,

    /// Bound on the number of candidates fetched from the listing
    pub videos_limit: Option<u32>,

    /// Ignore items published strictly before this date
    pub only_after: Option<Date>,
}

/// Synchronize a channel: list remote candidates, filter the ones already
/// imported or out of range, and submit one import job per kept candidate
/// as children of a finalize job.
///
/// When a session is supplied it is persisted on each state transition.
/// Any error escaping the run flips it to failed before propagating;
/// per-candidate failures only skip that candidate.
pub fn synchronize_channel(
    extractor: &dyn StreamExtractor,
    store: &dyn ImportStore,
    queue: &dyn JobQueue,
    channel: &Channel,
    external_channel_url: &str,
    options: &SyncOptions,
    mut session: Option<&mut ChannelSyncSession>,
) -> Result<()> {
    let outcome = run_sync(
        extractor,
        store,
        queue,
        channel,
        external_channel_url,
        options,
        session.as_deref_mut(),
    );

    if let Err(err) = outcome {
        if let Some(session) = session {
            session.fail();
            if let Err(save_err) = store.save_session(session) {
                warn!(
                    "Could not persist the failed sync state: {}",
                    miette::Report::from(save_err)
                );
            }
        }
        return Err(err);
    }

    Ok(())
}

fn run_sync(
    extractor: &dyn StreamExtractor,
    store: &dyn ImportStore,
    queue: &dyn JobQueue,
    channel: &Channel,
    external_channel_url: &str,
    options: &SyncOptions,
    mut session: Option<&mut ChannelSyncSession>,
) -> Result<()> {
    let session_id = session.as_deref().map(|s| s.id);

    if let Some(session) = session.as_deref_mut() {
        info!(
            "Starting sync session {} for '{}'",
            session.id, session.external_channel_url
        );
        session.start(OffsetDateTime::now_utc());
        store.save_session(session)?;
    }

    let user = store.load_user_by_channel_actor(channel.actor_id)?;
    debug!("Importing on behalf of user '{}'", user.username);

    let entries = playlist::fetch_entries(extractor, external_channel_url, options.videos_limit)?;

    let parent = FinalizeJob {
        channel_id: channel.id,
        sync_session_id: session_id,
    };

    if entries.is_empty() {
        // Zero candidates is success, not failure
        info!("No candidate to import for channel '{}'", channel.name);

        if let Some(session) = session.as_deref_mut() {
            session.complete();
            store.save_session(session)?;
        }

        queue.create_job_with_children(parent, Vec::new())?;
        return Ok(());
    }

    info!(
        "Found {} candidates to import for channel '{}'",
        entries.len(),
        channel.name
    );

    let mut children = Vec::with_capacity(entries.len());
    for entry in &entries {
        match skip_import(extractor, store, channel, entry, options) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                // A broken single item must never abort the whole run
                warn!(
                    "Could not inspect '{}', skipping it: {}",
                    entry.webpage_url,
                    miette::Report::from(err)
                );
                continue;
            }
        }

        children.push(ImportJob {
            channel_id: channel.id,
            user_id: user.id,
            target_url: entry.webpage_url.clone(),
            sync_session_id: session_id,
            // Forced to the public default unless specified upstream
            privacy: VideoPrivacy::default(),
            published_at_override: recovered_publish_date(entry),
        });
    }

    info!(
        "Submitting {} import jobs for channel '{}'",
        children.len(),
        channel.name
    );

    // Even when every candidate was skipped the parent is still
    // submitted, so the session resolves to synced once it runs
    queue.create_job_with_children(parent, children)?;

    Ok(())
}

/// Decide whether one candidate should be skipped: already imported, or
/// published before the caller's floor.
fn skip_import(
    extractor: &dyn StreamExtractor,
    store: &dyn ImportStore,
    channel: &Channel,
    entry: &PlaylistEntry,
    options: &SyncOptions,
) -> Result<bool> {
    if store.url_already_imported(channel.id, &entry.webpage_url)? {
        debug!("'{}' is already imported, skipping it", entry.webpage_url);
        return Ok(true);
    }

    if let Some(floor) = options.only_after {
        let records = extractor.get_info(&entry.webpage_url, options.format)?;
        let record = records.first().ok_or_else(|| Error::NoInfo {
            url: entry.webpage_url.clone(),
        })?;

        // Date-only comparison, the floor carries no time either
        if let Some(published) = normalize::normalize(record).originally_published_at {
            if published < floor {
                debug!(
                    "'{}' was published before {floor}, skipping it",
                    entry.webpage_url
                );
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn recovered_publish_date(entry: &PlaylistEntry) -> Option<Date> {
    let timestamp = entry.timestamp.or(entry.release_timestamp)?;
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    use time::macros::date;

    use super::*;
    use crate::{
        database::User,
        outside::{ListQuery, ToolFlavor},
        result::err_msg,
        types::RawExtractionRecord,
    };

    #[derive(Debug, Default)]
    struct FakeExtractor {
        /// Listed webpage URLs, newest first
        listing: Vec<String>,
        /// URL whose single-item detail fetch blows up
        broken_url: Option<String>,
        /// Upload date stamp reported for every item
        upload_date: Option<String>,
    }

    impl StreamExtractor for FakeExtractor {
        fn flavor(&self) -> ToolFlavor {
            ToolFlavor::Classic
        }

        fn get_info(&self, url: &str, _format: &str) -> Result<Vec<RawExtractionRecord>> {
            if self.broken_url.as_deref() == Some(url) {
                return Err(err_msg("tool crashed on this one"));
            }

            let upload_date = self.upload_date.as_deref().unwrap_or("20240101");
            let record = format!(
                r#"{{"webpage_url": "{url}", "title": "a title", "upload_date": "{upload_date}"}}"#
            );
            Ok(vec![record.parse().unwrap()])
        }

        fn list(&self, _url: &str, _query: &ListQuery) -> Result<Vec<RawExtractionRecord>> {
            self.listing
                .iter()
                .map(|url| {
                    Ok(format!(r#"{{"webpage_url": "{url}"}}"#).parse().unwrap())
                })
                .collect()
        }

        fn download(&self, _url: &str, _format: &str, _output: &Path) -> Result<()> {
            unreachable!("sync never downloads media")
        }

        fn download_subtitles(&self, _url: &str, _output_dir: &Path) -> Result<Vec<PathBuf>> {
            unreachable!("sync never downloads subtitles")
        }
    }

    #[derive(Debug, Default)]
    struct FakeStore {
        imported: HashSet<(i64, String)>,
        saved_states: RefCell<Vec<SyncState>>,
    }

    impl ImportStore for FakeStore {
        fn ensure_channel(&self, _name: &str) -> Result<Channel> {
            unreachable!()
        }

        fn load_user_by_channel_actor(&self, _actor_id: i64) -> Result<User> {
            Ok(User {
                id: 9,
                username: "importer".to_string(),
            })
        }

        fn url_already_imported(&self, channel_id: i64, url: &str) -> Result<bool> {
            Ok(self.imported.contains(&(channel_id, url.to_string())))
        }

        fn record_import(&self, _channel_id: i64, _url: &str) -> Result<()> {
            Ok(())
        }

        fn create_session(&self, _channel_id: i64, _url: &str) -> Result<ChannelSyncSession> {
            unreachable!()
        }

        fn load_session(&self, _id: i64) -> Result<ChannelSyncSession> {
            unreachable!()
        }

        fn save_session(&self, session: &ChannelSyncSession) -> Result<()> {
            self.saved_states.borrow_mut().push(session.state);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeQueue {
        batches: RefCell<Vec<JobGraph>>,
    }

    impl JobQueue for FakeQueue {
        fn create_job_with_children(
            &self,
            parent: FinalizeJob,
            children: Vec<ImportJob>,
        ) -> Result<()> {
            self.batches.borrow_mut().push(JobGraph { parent, children });
            Ok(())
        }
    }

    fn channel() -> Channel {
        Channel {
            id: 4,
            actor_id: 11,
            name: "chan".to_string(),
        }
    }

    fn options() -> SyncOptions<'static> {
        SyncOptions {
            format: "best",
            videos_limit: None,
            only_after: None,
        }
    }

    #[test]
    fn zero_candidates_resolves_to_synced_with_a_parent_only_job() {
        let extractor = FakeExtractor::default();
        let store = FakeStore::default();
        let queue = FakeQueue::default();
        let mut session = ChannelSyncSession::new(1, 4, "https://e.com/c".to_string());

        synchronize_channel(
            &extractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &options(),
            Some(&mut session),
        )
        .unwrap();

        assert_eq!(session.state, SyncState::Synced);
        assert_eq!(
            *store.saved_states.borrow(),
            vec![SyncState::Processing, SyncState::Synced]
        );

        let batches = queue.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].children.is_empty());
    }

    #[test]
    fn one_broken_candidate_out_of_three_still_submits_the_other_two() {
        let extractor = FakeExtractor {
            listing: vec![
                "https://e.com/w/3".to_string(),
                "https://e.com/w/2".to_string(),
                "https://e.com/w/1".to_string(),
            ],
            broken_url: Some("https://e.com/w/2".to_string()),
            upload_date: None,
        };
        let store = FakeStore::default();
        let queue = FakeQueue::default();

        let opts = SyncOptions {
            // A floor forces the single-item detail fetch for every candidate
            only_after: Some(date!(2000 - 01 - 01)),
            ..options()
        };

        synchronize_channel(
            &extractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &opts,
            None,
        )
        .unwrap();

        let batches = queue.batches.borrow();
        assert_eq!(batches.len(), 1);

        let urls: Vec<&str> = batches[0]
            .children
            .iter()
            .map(|job| job.target_url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://e.com/w/1", "https://e.com/w/3"]);
    }

    #[test]
    fn already_imported_urls_are_skipped() {
        let extractor = FakeExtractor {
            listing: vec![
                "https://e.com/w/2".to_string(),
                "https://e.com/w/1".to_string(),
            ],
            ..Default::default()
        };
        let mut store = FakeStore::default();
        store.imported.insert((4, "https://e.com/w/1".to_string()));
        let queue = FakeQueue::default();

        synchronize_channel(
            &extractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &options(),
            None,
        )
        .unwrap();

        let batches = queue.batches.borrow();
        assert_eq!(batches[0].children.len(), 1);
        assert_eq!(batches[0].children[0].target_url, "https://e.com/w/2");
    }

    #[test]
    fn candidates_published_before_the_floor_are_skipped() {
        let extractor = FakeExtractor {
            listing: vec!["https://e.com/w/old".to_string()],
            upload_date: Some("20200101".to_string()),
            ..Default::default()
        };
        let store = FakeStore::default();
        let queue = FakeQueue::default();

        let opts = SyncOptions {
            only_after: Some(date!(2023 - 06 - 01)),
            ..options()
        };

        synchronize_channel(
            &extractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &opts,
            None,
        )
        .unwrap();

        let batches = queue.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].children.is_empty());
    }

    #[test]
    fn jobs_carry_the_session_and_default_privacy() {
        let extractor = FakeExtractor {
            listing: vec!["https://e.com/w/1".to_string()],
            ..Default::default()
        };
        let store = FakeStore::default();
        let queue = FakeQueue::default();
        let mut session = ChannelSyncSession::new(8, 4, "https://e.com/c".to_string());

        synchronize_channel(
            &extractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &options(),
            Some(&mut session),
        )
        .unwrap();

        let batches = queue.batches.borrow();
        let job = &batches[0].children[0];
        assert_eq!(job.sync_session_id, Some(8));
        assert_eq!(job.user_id, 9);
        assert_eq!(job.privacy, VideoPrivacy::Public);
        assert_eq!(batches[0].parent.sync_session_id, Some(8));

        // Submission succeeded: the session stays processing until the
        // finalize job runs
        assert_eq!(session.state, SyncState::Processing);
    }

    #[derive(Debug)]
    struct BrokenListingExtractor;

    impl StreamExtractor for BrokenListingExtractor {
        fn flavor(&self) -> ToolFlavor {
            ToolFlavor::Classic
        }

        fn get_info(&self, _url: &str, _format: &str) -> Result<Vec<RawExtractionRecord>> {
            unreachable!()
        }

        fn list(&self, url: &str, _query: &ListQuery) -> Result<Vec<RawExtractionRecord>> {
            Err(Error::RetCode {
                url: url.to_string(),
                code: Some(1),
            })
        }

        fn download(&self, _url: &str, _format: &str, _output: &Path) -> Result<()> {
            unreachable!()
        }

        fn download_subtitles(&self, _url: &str, _output_dir: &Path) -> Result<Vec<PathBuf>> {
            unreachable!()
        }
    }

    #[test]
    fn a_listing_failure_flips_the_session_to_failed_and_propagates() {
        let store = FakeStore::default();
        let queue = FakeQueue::default();
        let mut session = ChannelSyncSession::new(1, 4, "https://e.com/c".to_string());

        let result = synchronize_channel(
            &BrokenListingExtractor,
            &store,
            &queue,
            &channel(),
            "https://e.com/c",
            &options(),
            Some(&mut session),
        );

        assert!(result.is_err());
        assert_eq!(session.state, SyncState::Failed);
        assert_eq!(
            *store.saved_states.borrow(),
            vec![SyncState::Processing, SyncState::Failed]
        );
        assert!(queue.batches.borrow().is_empty());
    }
}
