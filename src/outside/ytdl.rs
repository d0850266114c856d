use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use super::{
    command::{assert_success_command, run_command, Capture},
    provision,
};
use crate::{
    result::{Error, Result},
    settings::ToolSettings,
    types::RawExtractionRecord,
};

/// Fixed prefix the tool prints before each written subtitle file path
const SUBTITLE_PREFIX: &str = "[info] Writing video subtitles to: ";

/// Fields of an item record actually consumed downstream (normalizer,
/// playlist filter, format negotiation). Projected on extraction queries
/// when the tool supports it, to bound output size on long or
/// heavily-formatted sources.
const ITEM_FIELDS: &[&str] = &[
    "id",
    "webpage_url",
    "title",
    "description",
    "ext",
    "url",
    "urls",
    "thumbnail",
    "thumbnails",
    "formats",
    "subtitles",
    "tags",
    "categories",
    "license",
    "language",
    "age_limit",
    "is_live",
    "live_status",
    "upload_date",
    "timestamp",
    "release_timestamp",
];

/// Fields of the selected-format record consumed after a download
const FORMAT_FIELDS: &[&str] = &[
    "format_id",
    "url",
    "ext",
    "vcodec",
    "acodec",
    "width",
    "height",
    "fps",
    "tbr",
    "filesize",
];

/// Listing-pass filter excluding items that cannot be fetched yet or
/// anymore: live, upcoming, and freshly-ended broadcasts.
const UNAVAILABLE_FILTER: &str = "!is_live & live_status!=is_upcoming & live_status!=post_live";

/// Extraction tool variant, detected once at construction.
///
/// Call sites query capabilities instead of comparing binary names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFlavor {
    /// Legacy `youtube-dl`
    Classic,
    /// `yt-dlp`, the extended fork
    Extended,
}

impl ToolFlavor {
    fn from_binary(binary: &Path) -> Self {
        let name = binary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if name.contains("yt-dlp") {
            ToolFlavor::Extended
        } else {
            ToolFlavor::Classic
        }
    }

    /// The flat listing pass reports publish timestamps
    pub fn supports_flat_playlist_dates(self) -> bool {
        self == ToolFlavor::Extended
    }

    /// Listing calls accept `--match-filters` expressions
    pub fn supports_listing_filters(self) -> bool {
        self == ToolFlavor::Extended
    }

    /// Output size can be bounded with custom field projections
    pub fn supports_output_projection(self) -> bool {
        self == ToolFlavor::Extended
    }
}

/// Options for one listing call
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Fast pass yielding only URL + timestamps per entry
    pub flat: bool,
    /// Bounds tool-side work, not just client-side truncation
    pub latest_count: Option<u32>,
    /// Exclude live/upcoming/post-live items on the tool side
    pub exclude_unavailable: bool,
}

/// Interface to the external extraction tool.
///
/// Every call spawns one subprocess; concurrent calls on different URLs
/// are independent.
pub trait StreamExtractor: Debug {
    fn flavor(&self) -> ToolFlavor;

    /// Fetch the raw metadata records for a URL, one per item.
    /// Batched queries return one record per output line, in input order.
    fn get_info(&self, url: &str, format: &str) -> Result<Vec<RawExtractionRecord>>;

    /// Run one listing pass over a channel or playlist URL
    fn list(&self, url: &str, query: &ListQuery) -> Result<Vec<RawExtractionRecord>>;

    /// Download the media stream selected by the format chain into `output`
    fn download(&self, url: &str, format: &str, output: &Path) -> Result<()>;

    /// Download available subtitle tracks under `output_dir`, returning
    /// the written file paths.
    fn download_subtitles(&self, url: &str, output_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Interface for the `yt-dlp` / `youtube-dl` program
#[derive(Debug)]
pub struct Ytdl {
    interpreter: String,
    binary: PathBuf,
    flavor: ToolFlavor,
    proxy: Option<String>,
    force_ipv4: bool,
    encoder_path: Option<PathBuf>,
    download_timeout: Option<Duration>,
}

impl Ytdl {
    /// Build the tool handle, provisioning the binary first if it is
    /// absent. Provisioning failures only warn: they resurface on the
    /// first actual invocation.
    pub fn new(settings: &ToolSettings) -> Result<Self> {
        provision::ensure_binary(settings);

        let flavor = ToolFlavor::from_binary(&settings.binary_path);
        info!(
            "Using extraction tool '{}' ({flavor:?} variant)",
            settings.binary_path.display()
        );

        Ok(Self {
            interpreter: settings.interpreter.clone(),
            binary: settings.binary_path.clone(),
            flavor,
            proxy: settings.proxy.clone(),
            force_ipv4: settings.force_ipv4,
            encoder_path: settings.encoder_path.clone(),
            download_timeout: settings.download_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Verify that the binary is reachable and runnable
    pub fn probe(&self) -> Result<()> {
        let binary = self.binary.clone();
        assert_success_command(&self.interpreter, move |cmd| {
            cmd.arg(binary).arg("--version")
        })
        .map_err(|err| err.wrap_err_with(|| "Extraction tool binary is not runnable"))
    }

    /// Network/path wrapping, prepended in order:
    /// proxy, then forced IPv4, then the companion encoder path override.
    fn wrap_args(&self, args: Vec<String>) -> Vec<String> {
        let mut wrapped = Vec::new();

        if let Some(proxy) = &self.proxy {
            wrapped.push("--proxy".to_string());
            wrapped.push(proxy.clone());
        }

        if self.force_ipv4 {
            wrapped.push("--force-ipv4".to_string());
        }

        if let Some(encoder) = &self.encoder_path {
            wrapped.push("--ffmpeg-location".to_string());
            wrapped.push(encoder.display().to_string());
        }

        wrapped.extend(args);
        wrapped
    }

    /// One JSON record per item: plain `-j` on the classic variant, a
    /// projection of the consumed fields on the extended one.
    fn dump_args(&self) -> Vec<String> {
        if self.flavor.supports_output_projection() {
            vec!["-O".to_string(), format!("%(.{{{}}})j", ITEM_FIELDS.join(","))]
        } else {
            vec!["-j".to_string()]
        }
    }

    /// Extended-variant flags bounding output size on long-running or
    /// heavily-formatted sources.
    fn push_extended_args(&self, args: &mut Vec<String>) {
        if self.flavor != ToolFlavor::Extended {
            return;
        }

        // Strip live-chat data and heavy manifest formats
        args.push("--compat-options".to_string());
        args.push("no-live-chat".to_string());
        args.push("--extractor-args".to_string());
        args.push("youtube:skip=dash,hls".to_string());

        // Combined "best" breaks ties on resolution, then bitrate, then fps
        args.push("-S".to_string());
        args.push("res,tbr,fps".to_string());
    }

    /// Run one invocation: `<interpreter> <binary> <flags…> <url>`.
    ///
    /// Exit code 0 with empty stderr is the only success condition; stdout
    /// is trimmed and split into non-empty lines.
    fn run(&self, url: &str, args: Vec<String>, timeout: Option<Duration>) -> Result<Vec<String>> {
        let args = self.wrap_args(args);
        let binary = self.binary.clone();
        let url_arg = url.to_string();

        let output = run_command(
            &self.interpreter,
            move |cmd| cmd.arg(binary).args(args).arg("--").arg(url_arg),
            Capture::STDOUT | Capture::STDERR,
            timeout,
        )
        .map_err(|source| Error::Exec {
            url: url.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::RetCode {
                url: url.to_string(),
                code: output.status.code(),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(Error::Crash {
                url: url.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn parse_records(url: &str, lines: Vec<String>) -> Result<Vec<RawExtractionRecord>> {
        lines
            .iter()
            .map(|line| {
                line.parse::<RawExtractionRecord>()
                    .map_err(|err| err.wrap_err_with(|| format!("Malformed record for '{url}'")))
            })
            .collect()
    }
}

impl StreamExtractor for Ytdl {
    fn flavor(&self) -> ToolFlavor {
        self.flavor
    }

    fn get_info(&self, url: &str, format: &str) -> Result<Vec<RawExtractionRecord>> {
        let mut args = vec![
            "-q".to_string(),
            "--skip-download".to_string(),
            "-f".to_string(),
            format.to_string(),
        ];
        args.extend(self.dump_args());
        self.push_extended_args(&mut args);

        let lines = self.run(url, args, self.download_timeout)?;
        Self::parse_records(url, lines)
    }

    fn list(&self, url: &str, query: &ListQuery) -> Result<Vec<RawExtractionRecord>> {
        let mut args = vec!["-q".to_string(), "--skip-download".to_string()];

        if query.flat {
            // The flat pass is cheap by construction, no projection needed
            args.push("-j".to_string());
            args.push("--flat-playlist".to_string());
        } else {
            args.extend(self.dump_args());
            self.push_extended_args(&mut args);
        }

        if let Some(count) = query.latest_count {
            args.push("--playlist-end".to_string());
            args.push(count.to_string());
        }

        if query.exclude_unavailable && self.flavor.supports_listing_filters() {
            args.push("--match-filters".to_string());
            args.push(UNAVAILABLE_FILTER.to_string());
        }

        let lines = self.run(url, args, None)?;
        Self::parse_records(url, lines)
    }

    fn download(&self, url: &str, format: &str, output: &Path) -> Result<()> {
        let mut args = vec![
            "-q".to_string(),
            "-f".to_string(),
            format.to_string(),
            "-o".to_string(),
            output.display().to_string(),
            // Or else fails when the file already exists, even an empty one
            "--no-continue".to_string(),
        ];

        if self.flavor.supports_output_projection() {
            // Report which format the chain resolved to, trimmed to the
            // fields we care about
            args.push("-O".to_string());
            args.push(format!(
                "after_move:%(requested_downloads.0.{{{}}})j",
                FORMAT_FIELDS.join(",")
            ));
        }

        let lines = self.run(url, args, self.download_timeout)?;
        if let Some(line) = lines.first() {
            if let Ok(record) = line.parse::<RawExtractionRecord>() {
                debug!("Selected format: {record}");
            }
        }

        Ok(())
    }

    fn download_subtitles(&self, url: &str, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let args = vec![
            "--skip-download".to_string(),
            "--write-sub".to_string(),
            "--sub-format".to_string(),
            "vtt".to_string(),
            "-o".to_string(),
            output_dir.join("%(id)s").display().to_string(),
        ];

        let lines = self.run(url, args, None)?;

        // Subtitle paths are plain status lines, recovered by prefix match
        Ok(lines
            .iter()
            .filter_map(|line| line.strip_prefix(SUBTITLE_PREFIX))
            .map(PathBuf::from)
            .collect())
    }
}
