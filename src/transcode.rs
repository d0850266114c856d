use crate::types::{avg_bitrate, max_audio_bitrate, max_bitrate, min_bitrate, Resolution};

/// Audio codec a quick-copied stream must already use
const TARGET_AUDIO_CODEC: &str = "aac";
/// Channel layouts with known playback defects in target browsers
const BROKEN_CHANNEL_LAYOUTS: &[&str] = &["unknown", "quad"];

const MIN_FPS: f64 = 2.0;
const MAX_FPS: f64 = 65.0;

/// Multiplier applied to the input bitrate when capping the encode target
const BITRATE_CAP_FACTOR: f64 = 1.3;

/// Probed facts about a file's audio stream
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub codec_name: Option<String>,
    pub bitrate: Option<u64>,
    pub channel_layout: Option<String>,
}

/// Probed facts about a file's video stream
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    pub codec_name: Option<String>,
    pub pix_fmt: Option<String>,
    pub fps: f64,
    pub bitrate: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl VideoStream {
    pub fn resolution(&self) -> Resolution {
        Resolution::from_height(self.height)
    }

    /// Width over height, e.g. ~1.78 for 16:9
    pub fn ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Whether each stream of a downloaded file may be imported without
/// re-encoding, plus the bitrate to encode at when one may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeVerdict {
    pub quick_audio: bool,
    pub quick_video: bool,
    pub target_bitrate: Option<u64>,
}

/// Decide whether the audio stream is acceptable as-is.
///
/// The absence of any audio stream is acceptable: there is nothing to
/// re-encode. All checks are pure functions of the probe input, safe to
/// re-evaluate speculatively.
pub fn can_quick_copy_audio(audio: Option<&AudioStream>) -> bool {
    let Some(audio) = audio else {
        return true;
    };

    if audio.codec_name.as_deref() != Some(TARGET_AUDIO_CODEC) {
        return false;
    }

    let Some(bitrate) = audio.bitrate else {
        return false;
    };

    if bitrate > max_audio_bitrate(TARGET_AUDIO_CODEC, bitrate) {
        return false;
    }

    match audio.channel_layout.as_deref() {
        None => false,
        Some(layout) => !BROKEN_CHANNEL_LAYOUTS.contains(&layout),
    }
}

/// Decide whether the video stream is acceptable as-is
pub fn can_quick_copy_video(video: &VideoStream) -> bool {
    let Some(bitrate) = video.bitrate else {
        return false;
    };

    if video.codec_name.as_deref() != Some("h264") {
        return false;
    }

    if video.pix_fmt.as_deref() != Some("yuv420p") {
        return false;
    }

    if video.fps < MIN_FPS || video.fps > MAX_FPS {
        return false;
    }

    bitrate <= max_bitrate(video.resolution(), video.fps, video.ratio())
}

/// Full verdict for a probed file. The target bitrate is only computed
/// when the video stream needs re-encoding.
pub fn decide(audio: Option<&AudioStream>, video: &VideoStream) -> TranscodeVerdict {
    let quick_video = can_quick_copy_video(video);

    TranscodeVerdict {
        quick_audio: can_quick_copy_audio(audio),
        quick_video,
        target_bitrate: (!quick_video).then(|| {
            target_bitrate(video.resolution(), video.fps, video.ratio(), video.bitrate)
        }),
    }
}

/// Target bitrate envelope for re-encoding.
///
/// Starts from the average theoretical bitrate for the class, capped by
/// 130% of the input bitrate when one is known, and never below the
/// minimum theoretical bitrate. Without an input bitrate the average is
/// used directly.
pub fn target_bitrate(
    resolution: Resolution,
    fps: f64,
    ratio: f64,
    input_bitrate: Option<u64>,
) -> u64 {
    let average = avg_bitrate(resolution, fps, ratio);

    let Some(input) = input_bitrate else {
        return average;
    };

    let capped = average.min((input as f64 * BITRATE_CAP_FACTOR).floor() as u64);

    min_bitrate(resolution, fps, ratio).max(capped)
}
