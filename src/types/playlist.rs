use super::RawExtractionRecord;

/// One playlist listing entry: the item's webpage URL plus the publish and
/// release timestamps the listing pass managed to recover (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub webpage_url: String,
    pub timestamp: Option<i64>,
    pub release_timestamp: Option<i64>,
}

impl PlaylistEntry {
    /// Build an entry from one raw listing record.
    /// Returns `None` when the record carries no usable URL at all.
    pub fn from_record(record: &RawExtractionRecord) -> Option<Self> {
        let webpage_url = record
            .str_field("webpage_url")
            .or_else(|| record.str_field("url"))?
            .to_owned();

        Some(Self {
            webpage_url,
            timestamp: record.i64_field("timestamp"),
            release_timestamp: record.i64_field("release_timestamp"),
        })
    }
}
