use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    outside::{ListQuery, StreamExtractor},
    result::Result,
    types::PlaylistEntry,
};

/// Resolve the candidate entries of a channel or playlist URL.
///
/// On the extended tool two listing passes run: a fast flat pass that
/// recovers approximate publish timestamps cheaply, and the normal pass
/// filtered tool-side to exclude live/upcoming/post-live items. The
/// result is ordered oldest-first, ready for sequential import.
///
/// `latest_count` bounds tool-side work on both passes, not just
/// client-side truncation.
pub fn fetch_entries(
    extractor: &dyn StreamExtractor,
    url: &str,
    latest_count: Option<u32>,
) -> Result<Vec<PlaylistEntry>> {
    let records = extractor.list(
        url,
        &ListQuery {
            flat: false,
            latest_count,
            exclude_unavailable: true,
        },
    )?;

    let mut entries: Vec<PlaylistEntry> = records
        .iter()
        .filter_map(PlaylistEntry::from_record)
        .collect();

    if extractor.flavor().supports_flat_playlist_dates() {
        let flat_records = extractor.list(
            url,
            &ListQuery {
                flat: true,
                latest_count,
                exclude_unavailable: false,
            },
        )?;

        let flat: Vec<PlaylistEntry> = flat_records
            .iter()
            .filter_map(PlaylistEntry::from_record)
            .collect();

        merge_flat_timestamps(&mut entries, &flat);
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut entries = filter_available(entries, now);

    // The tool lists newest first; consumers import oldest first
    entries.reverse();
    Ok(entries)
}

/// Adopt the flat pass's timestamps, keyed by webpage URL.
///
/// A flat value overrides only when strictly positive: a zero or absent
/// flat value must never discard a present detailed value.
pub fn merge_flat_timestamps(entries: &mut [PlaylistEntry], flat: &[PlaylistEntry]) {
    let by_url: HashMap<&str, &PlaylistEntry> = flat
        .iter()
        .map(|entry| (entry.webpage_url.as_str(), entry))
        .collect();

    for entry in entries {
        let Some(flat_entry) = by_url.get(entry.webpage_url.as_str()) else {
            continue;
        };

        if let Some(ts) = flat_entry.timestamp.filter(|&ts| ts > 0) {
            entry.timestamp = Some(ts);
        }
        if let Some(ts) = flat_entry.release_timestamp.filter(|&ts| ts > 0) {
            entry.release_timestamp = Some(ts);
        }
    }
}

/// Drop entries whose release timestamp is strictly in the future:
/// scheduled premieres, not yet fetchable.
pub fn filter_available(entries: Vec<PlaylistEntry>, now_unix: i64) -> Vec<PlaylistEntry> {
    entries
        .into_iter()
        .filter(|entry| match entry.release_timestamp {
            Some(release) if release > now_unix => {
                debug!(
                    "Skipping '{}': scheduled for release at {release}",
                    entry.webpage_url
                );
                false
            }
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, timestamp: Option<i64>, release: Option<i64>) -> PlaylistEntry {
        PlaylistEntry {
            webpage_url: url.to_string(),
            timestamp,
            release_timestamp: release,
        }
    }

    #[test]
    fn positive_flat_timestamp_is_adopted() {
        let mut entries = vec![entry("https://e.com/1", None, None)];
        let flat = vec![entry("https://e.com/1", Some(1_600_000_000), Some(1_600_000_100))];

        merge_flat_timestamps(&mut entries, &flat);

        assert_eq!(entries[0].timestamp, Some(1_600_000_000));
        assert_eq!(entries[0].release_timestamp, Some(1_600_000_100));
    }

    #[test]
    fn absent_or_zero_flat_value_never_overwrites() {
        let mut entries = vec![
            entry("https://e.com/1", Some(1_500_000_000), Some(1_500_000_000)),
            entry("https://e.com/2", Some(1_500_000_000), None),
        ];
        let flat = vec![
            entry("https://e.com/1", None, Some(0)),
            entry("https://e.com/2", Some(0), None),
        ];

        merge_flat_timestamps(&mut entries, &flat);

        assert_eq!(entries[0].timestamp, Some(1_500_000_000));
        assert_eq!(entries[0].release_timestamp, Some(1_500_000_000));
        assert_eq!(entries[1].timestamp, Some(1_500_000_000));
    }

    #[test]
    fn urls_missing_from_the_flat_pass_are_left_alone() {
        let mut entries = vec![entry("https://e.com/1", Some(42), None)];
        merge_flat_timestamps(&mut entries, &[]);
        assert_eq!(entries[0].timestamp, Some(42));
    }

    #[test]
    fn future_premieres_are_dropped() {
        let now = 1_700_000_000;
        let entries = vec![
            entry("https://e.com/past", None, Some(now - 10)),
            entry("https://e.com/premiere", None, Some(now + 10)),
            entry("https://e.com/now", None, Some(now)),
            entry("https://e.com/undated", None, None),
        ];

        let kept = filter_available(entries, now);
        let urls: Vec<&str> = kept.iter().map(|e| e.webpage_url.as_str()).collect();

        assert_eq!(
            urls,
            vec!["https://e.com/past", "https://e.com/now", "https://e.com/undated"]
        );
    }
}
