use std::sync::OnceLock;

use regex::Regex;
use time::{Date, Month};
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::types::{RawExtractionRecord, VideoMetadata};

const NAME_MAX: usize = 120;
const NAME_MIN: usize = 3;
/// Appended when the truncated name is below the minimum length
const NAME_FILLER: &str = " video";
/// Appended when a value had to be cut at a word boundary
const OMISSION: &str = " […]";

const DESCRIPTION_MIN: usize = 3;
const DESCRIPTION_MAX: usize = 10_000;

// Exclusive bounds on the tag character count
const TAG_MIN: usize = 2;
const TAG_MAX: usize = 30;
const MAX_TAGS: usize = 5;

/// Age restriction at or above which the source is flagged NSFW
const NSFW_AGE_LIMIT: u64 = 16;

const CATEGORIES: &[(u16, &str)] = &[
    (1, "Music"),
    (2, "Films"),
    (3, "Vehicles"),
    (4, "Art"),
    (5, "Sports"),
    (6, "Travels"),
    (7, "Gaming"),
    (8, "People"),
    (9, "Comedy"),
    (10, "Entertainment"),
    (11, "News & Politics"),
    (12, "How To"),
    (13, "Education"),
    (14, "Activism"),
    (15, "Science & Technology"),
    (16, "Animals"),
    (17, "Kids"),
    (18, "Food"),
];

const LICENCES: &[(u16, &str)] = &[
    (1, "Attribution"),
    (2, "Attribution - Share Alike"),
    (3, "Attribution - No Derivatives"),
    (4, "Attribution - Non Commercial"),
    (5, "Attribution - Non Commercial - Share Alike"),
    (6, "Attribution - Non Commercial - No Derivatives"),
    (7, "Public Domain Dedication"),
];

/// Map one raw extraction record into canonical [`VideoMetadata`].
///
/// Never fails: every field degrades to an absent value on bad input
/// rather than rejecting the whole record.
pub fn normalize(record: &RawExtractionRecord) -> VideoMetadata {
    VideoMetadata {
        name: build_name(record.str_field("title").unwrap_or_default()),
        description: build_description(record.str_field("description")),
        category: build_category(record),
        licence: build_licence(record.str_field("license")),
        language: build_language(record.str_field("language")),
        nsfw: record.u64_field("age_limit").unwrap_or(0) >= NSFW_AGE_LIMIT,
        tags: build_tags(record),
        thumbnail_url: record.str_field("thumbnail").map(str::to_owned),
        urls: harvest_urls(record),
        ext: record.str_field("ext").map(str::to_owned),
        webpage_url: record.str_field("webpage_url").map(str::to_owned),
        is_live: record.bool_field("is_live").unwrap_or(false),
        originally_published_at: parse_upload_date(record.str_field("upload_date")),
        upload_timestamp: record.i64_field("timestamp"),
    }
}

/// Truncate on a word/punctuation boundary, appending the omission marker.
///
/// The result never exceeds `max` characters, omission included. When no
/// boundary exists in the kept prefix, the prefix is cut as-is.
fn truncate_on_word_boundary(value: &str, max: usize) -> String {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let separator = SEPARATOR.get_or_init(|| Regex::new(r",? +").unwrap());

    if value.chars().count() <= max {
        return value.to_owned();
    }

    let keep = max - OMISSION.chars().count();
    let prefix: String = value.chars().take(keep).collect();

    let cut = separator
        .find_iter(&prefix)
        .last()
        .map_or(prefix.len(), |m| m.start());

    format!("{}{OMISSION}", &prefix[..cut])
}

fn build_name(title: &str) -> String {
    let name = truncate_on_word_boundary(title, NAME_MAX);

    if name.chars().count() < NAME_MIN {
        name + NAME_FILLER
    } else {
        name
    }
}

fn build_description(description: Option<&str>) -> Option<String> {
    let description = description?;
    if description.chars().count() < DESCRIPTION_MIN {
        return None;
    }

    Some(truncate_on_word_boundary(description, DESCRIPTION_MAX))
}

fn build_category(record: &RawExtractionRecord) -> Option<u16> {
    let first = record
        .array_field("categories")
        .and_then(|categories| categories.first())
        .and_then(|v| v.as_str())?;

    // Hard-coded alias checked before the generic lookup
    if first == "News & Politics" {
        return Some(11);
    }

    CATEGORIES
        .iter()
        .find(|(_, label)| label.eq_ignore_ascii_case(first))
        .map(|(code, _)| *code)
}

fn build_licence(licence: Option<&str>) -> Option<u16> {
    let licence = licence?;

    // Hard-coded alias checked before the generic lookup
    if licence.contains("Creative Commons Attribution") {
        return Some(1);
    }

    LICENCES
        .iter()
        .find(|(_, label)| label.eq_ignore_ascii_case(licence))
        .map(|(code, _)| *code)
}

/// Accept 2 and 3 letter language codes, lowercased.
/// Anything else resolves to absent, never to an error.
fn build_language(language: Option<&str>) -> Option<String> {
    let language = language?;
    let valid = matches!(language.len(), 2 | 3) && language.chars().all(|c| c.is_ascii_alphabetic());

    valid.then(|| language.to_ascii_lowercase())
}

fn build_tags(record: &RawExtractionRecord) -> Vec<String> {
    let Some(tags) = record.array_field("tags") else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(|v| v.as_str())
        .filter(|tag| {
            let len = tag.chars().count();
            len > TAG_MIN && len < TAG_MAX
        })
        .map(|tag| tag.nfc().collect::<String>())
        .take(MAX_TAGS)
        .collect()
}

/// Parse the 8-digit `YYYYMMDD` upload stamp into a date-only value.
/// Time-of-day components are zero by construction.
fn parse_upload_date(stamp: Option<&str>) -> Option<Date> {
    static STAMP: OnceLock<Regex> = OnceLock::new();
    let re = STAMP.get_or_init(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap());

    let cap = re.captures(stamp?)?;

    let year: i32 = cap[1].parse().ok()?;
    let month: u8 = cap[2].parse().ok()?;
    let day: u8 = cap[3].parse().ok()?;

    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// Union of every URL the record exposes: the direct URL field, the
/// array-or-scalar `urls` field, per-format URLs, per-thumbnail URLs, the
/// top-level thumbnail, and per-subtitle-track URLs. Only syntactically
/// valid http(s) URLs survive; order is preserved and duplicates are kept
/// (consumers tolerate them).
fn harvest_urls(record: &RawExtractionRecord) -> Vec<String> {
    let mut urls: Vec<&str> = Vec::new();

    if let Some(url) = record.str_field("url") {
        urls.push(url);
    }

    match record.get("urls") {
        Some(serde_json::Value::Array(values)) => {
            urls.extend(values.iter().filter_map(|v| v.as_str()));
        }
        Some(serde_json::Value::String(value)) => urls.push(value.as_str()),
        _ => {}
    }

    if let Some(formats) = record.array_field("formats") {
        urls.extend(
            formats
                .iter()
                .filter_map(|f| f.get("url"))
                .filter_map(|v| v.as_str()),
        );
    }

    if let Some(thumbnails) = record.array_field("thumbnails") {
        urls.extend(
            thumbnails
                .iter()
                .filter_map(|t| t.get("url"))
                .filter_map(|v| v.as_str()),
        );
    }

    if let Some(thumbnail) = record.str_field("thumbnail") {
        urls.push(thumbnail);
    }

    if let Some(subtitles) = record.get("subtitles").and_then(|v| v.as_object()) {
        for tracks in subtitles.values().filter_map(|v| v.as_array()) {
            urls.extend(
                tracks
                    .iter()
                    .filter_map(|t| t.get("url"))
                    .filter_map(|v| v.as_str()),
            );
        }
    }

    urls.into_iter()
        .filter(|candidate| is_valid_url(candidate))
        .map(str::to_owned)
        .collect()
}

fn is_valid_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
