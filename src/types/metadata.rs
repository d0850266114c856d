use time::Date;

/// Canonical, validated metadata for one remote video.
///
/// Produced by the normalizer from a [`super::RawExtractionRecord`]; every
/// field is already truncated, mapped, or filtered. Invariants upheld by
/// construction: at most 5 tags, `originally_published_at` carries no
/// time-of-day component, `urls` contains only syntactically valid URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<u16>,
    pub licence: Option<u16>,
    pub language: Option<String>,
    pub nsfw: bool,
    pub tags: Vec<String>,
    pub thumbnail_url: Option<String>,
    pub urls: Vec<String>,
    pub ext: Option<String>,
    pub webpage_url: Option<String>,
    pub is_live: bool,
    pub originally_published_at: Option<Date>,
    pub upload_timestamp: Option<i64>,
}
