use crate::types::Resolution;

/// Resolution used when no resolution is enabled in the configuration
const DEFAULT_RESOLUTION: Resolution = Resolution::R1080;

/// Build the ordered format-selector chain handed to the extraction tool.
///
/// Tiers are joined with `/`, the tool's or-else separator, and tried
/// strictly in declared order. AV1 and VP9 profile 2 are excluded from
/// every tier that could pick them: both are known to break playback
/// downstream, so this is a hard policy, not a preference.
///
/// When `use_best_format` is set the resolution-specific tiers are skipped
/// entirely and only the universal fallbacks remain.
pub fn format_selector(enabled_resolutions: &[Resolution], use_best_format: bool) -> String {
    let mut tiers: Vec<String> = Vec::with_capacity(7);

    if !use_best_format {
        let height = enabled_resolutions
            .iter()
            .max()
            .copied()
            .unwrap_or(DEFAULT_RESOLUTION)
            .height();

        tiers.push(format!(
            "bestvideo[vcodec^=avc1][height={height}]+bestaudio[ext=m4a]"
        ));
        tiers.push(format!(
            "bestvideo[vcodec!*=av01][vcodec!*=vp9.2][height={height}]+bestaudio"
        ));
        tiers.push(format!(
            "bestvideo[vcodec^=avc1][height<={height}]+bestaudio[ext=m4a]"
        ));
    }

    // Universal fallbacks, identical regardless of mode
    tiers.push("bestvideo[vcodec!*=av01][vcodec!*=vp9.2]+bestaudio".to_string());
    tiers.push("best[vcodec!*=av01][vcodec!*=vp9.2]".to_string());
    tiers.push("bestvideo[ext=mp4]+bestaudio[ext=m4a]".to_string());
    tiers.push("best".to_string());

    tiers.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers(selector: &str) -> Vec<&str> {
        selector.split('/').collect()
    }

    #[test]
    fn chain_has_three_specific_plus_four_universal_tiers() {
        let selector = format_selector(&[Resolution::R720], false);
        assert_eq!(tiers(&selector).len(), 7);
    }

    #[test]
    fn best_format_mode_keeps_only_universal_tiers() {
        let selector = format_selector(&[Resolution::R720], true);
        let tiers = tiers(&selector);
        assert_eq!(tiers.len(), 4);
        assert_eq!(*tiers.last().unwrap(), "best");
        assert!(tiers.iter().all(|t| !t.contains("height")));
    }

    #[test]
    fn picks_the_maximum_enabled_resolution() {
        let selector = format_selector(
            &[Resolution::R480, Resolution::R1440, Resolution::R720],
            false,
        );
        assert!(selector.starts_with("bestvideo[vcodec^=avc1][height=1440]+bestaudio[ext=m4a]"));
    }

    #[test]
    fn empty_set_falls_back_to_1080p() {
        let selector = format_selector(&[], false);
        assert!(selector.contains("[height=1080]"));
        assert!(selector.contains("[height<=1080]"));
    }

    #[test]
    fn incompatible_codecs_are_excluded_from_fallback_tiers() {
        let selector = format_selector(&[], true);
        assert!(selector.contains("[vcodec!*=av01]"));
        assert!(selector.contains("[vcodec!*=vp9.2]"));
    }

    #[test]
    fn order_is_most_specific_first() {
        let selector = format_selector(&[Resolution::R1080], false);
        let tiers = tiers(&selector);
        assert!(tiers[0].contains("[height=1080]"));
        assert!(tiers[2].contains("[height<=1080]"));
        assert_eq!(*tiers.last().unwrap(), "best");
    }
}
