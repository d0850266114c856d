use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    normalize,
    outside::{probe_file, FileProbe, StreamExtractor},
    result::{Error, Result, ValidationError, ValidationKind},
    settings::ImportSettings,
    transcode::{self, TranscodeVerdict},
    types::VideoMetadata,
};

/// Stderr fingerprints of a target that exists but is not published yet
const NOT_YET_PUBLISHED_MARKERS: &[&str] = &["will begin in", "premieres in"];
/// Stderr fingerprints of a target still being post-processed remotely
const POST_PROCESSING_MARKERS: &[&str] = &["post-processing", "still being processed"];

/// Everything known about a single imported file once it is on disk
#[derive(Debug)]
pub struct ImportOutcome {
    pub metadata: VideoMetadata,
    /// Downloaded media; deleted when the handle drops
    pub file: NamedTempFile,
    pub probe: FileProbe,
    pub verdict: TranscodeVerdict,
}

/// Fetch and validate the metadata of one target URL.
///
/// Policy rejections (live target, no usable info, no formats) and tool
/// failures all surface as a [`Error::Validation`] carrying the
/// originating error and a distinct user-facing sub-reason.
pub fn fetch_import_info(
    extractor: &dyn StreamExtractor,
    url: &str,
    format: &str,
) -> Result<VideoMetadata> {
    inspect_target(extractor, url, format).map_err(|err| into_validation_error(err, url))
}

fn inspect_target(
    extractor: &dyn StreamExtractor,
    url: &str,
    format: &str,
) -> Result<VideoMetadata> {
    let records = extractor.get_info(url, format)?;

    let record = records.first().ok_or_else(|| Error::NoInfo {
        url: url.to_string(),
    })?;

    if records.len() > 1 {
        debug!("'{url}' resolved to {} records, using the first", records.len());
    }

    let metadata = normalize::normalize(record);

    if metadata.is_live {
        return Err(Error::IsLive {
            url: url.to_string(),
        });
    }

    let has_formats = record
        .array_field("formats")
        .is_some_and(|formats| !formats.is_empty());
    if !has_formats {
        return Err(Error::NoFormats {
            url: url.to_string(),
        });
    }

    Ok(metadata)
}

/// Map an extraction failure to the validation sub-reason shown to users
fn into_validation_error(err: Error, url: &str) -> Error {
    let kind = match &err {
        Error::IsLive { .. } => ValidationKind::Live,
        Error::NoFormats { .. } => ValidationKind::NoFormatsAvailable,
        Error::Crash { stderr, .. } => classify_stderr(stderr),
        _ => ValidationKind::Availability,
    };

    Error::Validation(ValidationError {
        kind,
        url: url.to_string(),
        cause: Some(Box::new(err)),
    })
}

fn classify_stderr(stderr: &str) -> ValidationKind {
    let stderr = stderr.to_lowercase();

    if NOT_YET_PUBLISHED_MARKERS.iter().any(|m| stderr.contains(m)) {
        ValidationKind::NotYetPublished
    } else if POST_PROCESSING_MARKERS.iter().any(|m| stderr.contains(m)) {
        ValidationKind::StillPostProcessing
    } else {
        ValidationKind::Availability
    }
}

/// Download one validated target into a temporary file, probe its
/// streams, and decide whether they can be imported without re-encoding.
pub fn download_and_inspect(
    extractor: &dyn StreamExtractor,
    url: &str,
    format: &str,
    import_settings: &ImportSettings,
) -> Result<ImportOutcome> {
    let metadata = fetch_import_info(extractor, url, format)?;

    debug!("name        = {}", metadata.name);
    debug!("webpage     = {:?}", metadata.webpage_url);
    debug!("category    = {:?}", metadata.category);
    debug!("licence     = {:?}", metadata.licence);
    debug!("language    = {:?}", metadata.language);
    debug!("nsfw        = {}", metadata.nsfw);
    debug!("tags        = {:?}", metadata.tags);
    debug!("published   = {:?}", metadata.originally_published_at);
    debug!("timestamp   = {:?}", metadata.upload_timestamp);
    debug!("thumbnail   = {:?}", metadata.thumbnail_url);
    debug!("urls        = {} harvested", metadata.urls.len());
    debug!(
        "description = {} bytes long",
        metadata.description.as_deref().map_or(0, str::len)
    );

    let ext = metadata.ext.as_deref().unwrap_or("mp4");
    let file = tempfile::Builder::new()
        .prefix("mediatug-")
        .suffix(&format!(".{ext}"))
        .tempfile()?;

    info!("Downloading '{url}'");
    extractor.download(url, format, file.path())?;

    let probe = probe_file(file.path())?;

    let verdict = match &probe.video {
        Some(video) if !import_settings.always_transcode_original => {
            transcode::decide(probe.audio.as_ref(), video)
        }
        Some(video) => {
            // Re-encode forced by configuration
            TranscodeVerdict {
                quick_audio: false,
                quick_video: false,
                target_bitrate: Some(transcode::target_bitrate(
                    video.resolution(),
                    video.fps,
                    video.ratio(),
                    video.bitrate,
                )),
            }
        }
        None => {
            return Err(Error::NoFormats {
                url: url.to_string(),
            })
        }
    };

    debug!(
        "Transcode verdict for '{url}': quick_audio={}, quick_video={}, target_bitrate={:?}",
        verdict.quick_audio, verdict.quick_video, verdict.target_bitrate
    );

    Ok(ImportOutcome {
        metadata,
        file,
        probe,
        verdict,
    })
}

/// Fetch available subtitle tracks for a target into a directory
pub fn fetch_subtitles(
    extractor: &dyn StreamExtractor,
    url: &str,
    output_dir: &std::path::Path,
) -> Result<Vec<PathBuf>> {
    let paths = extractor.download_subtitles(url, output_dir)?;
    info!("Fetched {} subtitle tracks for '{url}'", paths.len());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        outside::{ListQuery, ToolFlavor},
        types::RawExtractionRecord,
    };

    /// Extractor returning one canned record, or one canned error
    #[derive(Debug)]
    struct CannedExtractor {
        records: Vec<&'static str>,
        error: Option<fn(&str) -> Error>,
    }

    impl StreamExtractor for CannedExtractor {
        fn flavor(&self) -> ToolFlavor {
            ToolFlavor::Extended
        }

        fn get_info(&self, url: &str, _format: &str) -> Result<Vec<RawExtractionRecord>> {
            if let Some(make_err) = self.error {
                return Err(make_err(url));
            }
            Ok(self.records.iter().map(|r| r.parse().unwrap()).collect())
        }

        fn list(&self, _url: &str, _query: &ListQuery) -> Result<Vec<RawExtractionRecord>> {
            unreachable!()
        }

        fn download(&self, _url: &str, _format: &str, _output: &Path) -> Result<()> {
            unreachable!()
        }

        fn download_subtitles(&self, _url: &str, _output_dir: &Path) -> Result<Vec<PathBuf>> {
            unreachable!()
        }
    }

    fn validation_kind(result: Result<VideoMetadata>) -> ValidationKind {
        match result.unwrap_err() {
            Error::Validation(err) => err.kind,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn a_live_target_is_rejected_as_live() {
        let extractor = CannedExtractor {
            records: vec![r#"{"title": "t", "is_live": true, "formats": [{"url": "x"}]}"#],
            error: None,
        };

        let kind = validation_kind(fetch_import_info(&extractor, "https://e.com/w/1", "best"));
        assert_eq!(kind, ValidationKind::Live);
    }

    #[test]
    fn empty_info_is_rejected_as_availability() {
        let extractor = CannedExtractor {
            records: vec![],
            error: None,
        };

        let kind = validation_kind(fetch_import_info(&extractor, "https://e.com/w/1", "best"));
        assert_eq!(kind, ValidationKind::Availability);
    }

    #[test]
    fn missing_formats_are_rejected_as_no_formats() {
        let extractor = CannedExtractor {
            records: vec![r#"{"title": "t", "formats": []}"#],
            error: None,
        };

        let kind = validation_kind(fetch_import_info(&extractor, "https://e.com/w/1", "best"));
        assert_eq!(kind, ValidationKind::NoFormatsAvailable);
    }

    #[test]
    fn premiere_crashes_map_to_not_yet_published() {
        let extractor = CannedExtractor {
            records: vec![],
            error: Some(|url| Error::Crash {
                url: url.to_string(),
                stderr: "ERROR: This live event will begin in 3 hours".to_string(),
            }),
        };

        let kind = validation_kind(fetch_import_info(&extractor, "https://e.com/w/1", "best"));
        assert_eq!(kind, ValidationKind::NotYetPublished);
    }

    #[test]
    fn post_processing_crashes_map_to_still_post_processing() {
        let extractor = CannedExtractor {
            records: vec![],
            error: Some(|url| Error::Crash {
                url: url.to_string(),
                stderr: "This video is still being processed".to_string(),
            }),
        };

        let kind = validation_kind(fetch_import_info(&extractor, "https://e.com/w/1", "best"));
        assert_eq!(kind, ValidationKind::StillPostProcessing);
    }

    #[test]
    fn valid_targets_pass_with_normalized_metadata() {
        let extractor = CannedExtractor {
            records: vec![
                r#"{"title": "Hi", "formats": [{"url": "https://cdn.e.com/v.mp4"}], "upload_date": "20230601"}"#,
            ],
            error: None,
        };

        let metadata = fetch_import_info(&extractor, "https://e.com/w/1", "best").unwrap();
        assert_eq!(metadata.name, "Hi video");
        assert!(metadata.originally_published_at.is_some());
    }

    #[test]
    fn the_validation_cause_preserves_the_original_error() {
        let extractor = CannedExtractor {
            records: vec![],
            error: Some(|url| Error::RetCode {
                url: url.to_string(),
                code: Some(1),
            }),
        };

        match fetch_import_info(&extractor, "https://e.com/w/1", "best").unwrap_err() {
            Error::Validation(err) => {
                assert_eq!(err.kind, ValidationKind::Availability);
                assert!(matches!(
                    err.cause.as_deref(),
                    Some(Error::RetCode { code: Some(1), .. })
                ));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
