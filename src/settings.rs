use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic};
use serde::Deserialize;

use crate::{result::Result, types::Resolution};

/// Full application configuration, loaded from an optional TOML file with
/// `MEDIATUG_*` environment overrides, and threaded explicitly through
/// constructors.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path of the local bookkeeping database
    pub database_path: PathBuf,

    #[serde(default)]
    pub import: ImportSettings,
    pub tool: ToolSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportSettings {
    /// Resolutions enabled for on-demand videos. The format chain targets
    /// the highest of the set.
    #[serde(default)]
    pub enabled_resolutions: Vec<Resolution>,

    /// Skip the resolution-specific tiers and take the best variant
    #[serde(default)]
    pub use_best_format: bool,

    /// Re-encode the original resolution even when its streams would be
    /// acceptable as-is
    #[serde(default)]
    pub always_transcode_original: bool,

    /// Default bound on candidates inspected per channel sync
    pub videos_limit: Option<u32>,

    /// Where downloaded media ends up
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            enabled_resolutions: Vec::new(),
            use_best_format: false,
            always_transcode_original: false,
            videos_limit: None,
            download_dir: default_download_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolSettings {
    /// Interpreter running the extraction tool
    pub interpreter: String,

    /// Where the extraction binary lives (or gets provisioned to)
    pub binary_path: PathBuf,

    /// Release feed queried when the binary must be provisioned
    pub release_feed_url: String,

    /// Release artifact name for this platform
    pub platform_asset: String,

    /// Proxy endpoint forwarded to the tool
    pub proxy: Option<String>,

    /// Force IPv4 on every tool invocation
    #[serde(default)]
    pub force_ipv4: bool,

    /// Explicit path to the companion encoding tool
    pub encoder_path: Option<PathBuf>,

    /// Time budget for download and single-item info calls, in seconds
    pub download_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("database_path", "mediatug.db")
            .into_diagnostic()?
            .set_default("tool.interpreter", "python3")
            .into_diagnostic()?
            .set_default("tool.binary_path", "bin/yt-dlp")
            .into_diagnostic()?
            .set_default(
                "tool.release_feed_url",
                "https://github.com/yt-dlp/yt-dlp/releases/latest/download",
            )
            .into_diagnostic()?
            .set_default("tool.platform_asset", "yt-dlp")
            .into_diagnostic()?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let settings = builder
            .add_source(Environment::with_prefix("MEDIATUG").separator("__"))
            .build()
            .into_diagnostic()
            .wrap_err("Could not load the configuration")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_required_field() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings.tool.interpreter, "python3");
        assert_eq!(settings.tool.platform_asset, "yt-dlp");
        assert!(!settings.tool.force_ipv4);
        assert!(settings.import.enabled_resolutions.is_empty());
        assert!(!settings.import.use_best_format);
        assert_eq!(settings.import.download_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();

        use std::io::Write;
        writeln!(
            file,
            r#"
            database_path = "/var/lib/mediatug/state.db"

            [import]
            enabled_resolutions = ["720p", "1080p"]
            videos_limit = 25

            [tool]
            force_ipv4 = true
            proxy = "socks5://127.0.0.1:9050"
            "#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(
            settings.import.enabled_resolutions,
            vec![Resolution::R720, Resolution::R1080]
        );
        assert_eq!(settings.import.videos_limit, Some(25));
        assert!(settings.tool.force_ipv4);
        assert_eq!(
            settings.tool.proxy.as_deref(),
            Some("socks5://127.0.0.1:9050")
        );
    }
}
