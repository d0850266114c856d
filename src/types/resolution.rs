use std::fmt::Display;

use clap::ValueEnum;
use serde::Deserialize;

/// Standard resolution classes understood by the import pipeline.
///
/// Ordering follows vertical pixel count, so `max()` over a set of enabled
/// resolutions picks the highest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(alias = "144p")]
    #[value(name = "144p")]
    R144,
    #[serde(alias = "240p")]
    #[value(name = "240p")]
    R240,
    #[serde(alias = "360p")]
    #[value(name = "360p")]
    R360,
    #[serde(alias = "480p")]
    #[value(name = "480p")]
    R480,
    #[serde(alias = "720p")]
    #[value(name = "720p")]
    R720,
    #[serde(alias = "1080p")]
    #[value(name = "1080p")]
    R1080,
    #[serde(alias = "1440p")]
    #[value(name = "1440p")]
    R1440,
    #[serde(alias = "2160p")]
    #[value(name = "2160p")]
    R2160,
}

impl Resolution {
    /// Vertical pixel count of the class
    pub fn height(self) -> u32 {
        match self {
            Resolution::R144 => 144,
            Resolution::R240 => 240,
            Resolution::R360 => 360,
            Resolution::R480 => 480,
            Resolution::R720 => 720,
            Resolution::R1080 => 1080,
            Resolution::R1440 => 1440,
            Resolution::R2160 => 2160,
        }
    }

    /// Map an arbitrary stream height to the closest class at or below it.
    /// Heights below the smallest class clamp to it.
    pub fn from_height(height: u32) -> Self {
        use Resolution::*;
        let mut best = R144;
        for r in [R144, R240, R360, R480, R720, R1080, R1440, R2160] {
            if r.height() <= height {
                best = r;
            }
        }
        best
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}p", self.height())
    }
}
