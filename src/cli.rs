use std::path::PathBuf;

use clap::{Parser, Subcommand};
use time::{macros::format_description, Date};

use crate::types::Resolution;

macro_rules! arg_env {
    ($v:literal) => {
        concat!("MEDIATUG_", $v)
    };
}

/// Wrapper-tool around `yt-dlp` to mirror remote videos and channels into
/// a local library. Fetch, normalize metadata, and queue import jobs.
#[derive(Parser, Debug)]
pub struct Args {
    /// The path to the TOML settings file
    #[clap(long, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// Print debug logs
    #[clap(long, env = arg_env!("VERBOSE"))]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect, download, and record a single video URL
    Import {
        /// The video page URL
        url: String,

        /// Local channel the import is attributed to
        #[clap(long, default_value = "main", env = arg_env!("CHANNEL"))]
        channel: String,

        /// Also fetch the available subtitle tracks
        #[clap(long)]
        subtitles: bool,

        /// Target resolution, overriding the configured set
        #[clap(long, value_enum)]
        resolution: Option<Resolution>,
    },

    /// Synchronize the latest videos of a remote channel into import jobs
    Sync {
        /// The remote channel or playlist URL
        url: String,

        /// Local channel the imports are attributed to
        #[clap(long, default_value = "main", env = arg_env!("CHANNEL"))]
        channel: String,

        /// Bound the number of inspected candidates.
        /// Overrides the configured limit.
        #[clap(long, env = arg_env!("LIMIT"))]
        limit: Option<u32>,

        /// Ignore items published before this date (YYYY-MM-DD)
        #[clap(long, value_parser = parse_date, env = arg_env!("ONLY_AFTER"))]
        only_after: Option<Date>,
    },
}

fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_after_accepts_iso_dates() {
        let date = parse_date("2023-06-01").unwrap();
        assert_eq!((date.year(), date.month() as u8, date.day()), (2023, 6, 1));

        assert!(parse_date("01/06/2023").is_err());
        assert!(parse_date("20230601").is_err());
    }
}
