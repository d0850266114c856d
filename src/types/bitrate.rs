//! Theoretical bitrate references.
//!
//! These are policy bounds derived from the resolution class, not measured
//! values. A stream is judged against them to decide whether its encoding
//! can be reused as-is, and they bound the target bitrate when re-encoding.

use super::Resolution;

/// Highest bitrate the AAC encoder is allowed to produce
const MAX_AAC_BITRATE: u64 = 384_000;
/// Highest bitrate the MP3 encoder is allowed to produce
const MAX_MP3_BITRATE: u64 = 320_000;

/// Maximum acceptable audio bitrate for the observed source bitrate class.
///
/// Sources below the codec ceiling are acceptable as-is, so the cap is the
/// observed bitrate itself. Unknown codecs get a zero cap, rejecting any
/// known bitrate.
pub fn max_audio_bitrate(codec: &str, bitrate: u64) -> u64 {
    match codec {
        "aac" => bitrate.min(MAX_AAC_BITRATE),
        "mp3" => bitrate.min(MAX_MP3_BITRATE),
        _ => 0,
    }
}

fn avg_bits_per_pixel(resolution: Resolution) -> f64 {
    match resolution {
        Resolution::R144 => 0.19,
        Resolution::R240 => 0.17,
        Resolution::R360 => 0.15,
        Resolution::R480 => 0.12,
        Resolution::R720 => 0.11,
        Resolution::R1080 => 0.10,
        Resolution::R1440 => 0.09,
        Resolution::R2160 => 0.08,
    }
}

fn max_bits_per_pixel(resolution: Resolution) -> f64 {
    match resolution {
        Resolution::R144 => 0.32,
        Resolution::R240 => 0.29,
        Resolution::R360 => 0.26,
        Resolution::R480 => 0.22,
        Resolution::R720 => 0.19,
        Resolution::R1080 => 0.17,
        Resolution::R1440 => 0.16,
        Resolution::R2160 => 0.14,
    }
}

// Below this the output is unwatchable whatever the resolution
const MIN_BITS_PER_PIXEL: f64 = 0.02;

fn compute_bitrate(resolution: Resolution, fps: f64, ratio: f64, bits_per_pixel: f64) -> u64 {
    let height = f64::from(resolution.height());

    // height² × ratio = pixel count of the frame
    (height * height * ratio * fps * bits_per_pixel).floor() as u64
}

/// Minimum theoretical bitrate for the resolution class, in bits per second
pub fn min_bitrate(resolution: Resolution, fps: f64, ratio: f64) -> u64 {
    compute_bitrate(resolution, fps, ratio, MIN_BITS_PER_PIXEL)
}

/// Average theoretical bitrate for the resolution class, in bits per second
pub fn avg_bitrate(resolution: Resolution, fps: f64, ratio: f64) -> u64 {
    compute_bitrate(resolution, fps, ratio, avg_bits_per_pixel(resolution))
}

/// Maximum theoretical bitrate for the resolution class, in bits per second
pub fn max_bitrate(resolution: Resolution, fps: f64, ratio: f64) -> u64 {
    compute_bitrate(resolution, fps, ratio, max_bits_per_pixel(resolution))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATIO_16_9: f64 = 16.0 / 9.0;

    #[test]
    fn bounds_are_ordered() {
        for resolution in [
            Resolution::R144,
            Resolution::R360,
            Resolution::R720,
            Resolution::R1080,
            Resolution::R2160,
        ] {
            let min = min_bitrate(resolution, 30.0, RATIO_16_9);
            let avg = avg_bitrate(resolution, 30.0, RATIO_16_9);
            let max = max_bitrate(resolution, 30.0, RATIO_16_9);
            assert!(min < avg, "{resolution}: {min} >= {avg}");
            assert!(avg < max, "{resolution}: {avg} >= {max}");
        }
    }

    #[test]
    fn fps_scales_linearly() {
        let at_30 = avg_bitrate(Resolution::R1080, 30.0, RATIO_16_9);
        let at_60 = avg_bitrate(Resolution::R1080, 60.0, RATIO_16_9);
        assert_eq!(at_60, at_30 * 2);
    }

    #[test]
    fn aac_cap_is_observed_bitrate_below_ceiling() {
        assert_eq!(max_audio_bitrate("aac", 128_000), 128_000);
        assert_eq!(max_audio_bitrate("aac", 500_000), 384_000);
        assert_eq!(max_audio_bitrate("opus", 128_000), 0);
    }
}
