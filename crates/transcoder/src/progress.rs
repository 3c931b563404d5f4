//! Progress estimation and early-abort policy for running encodes.

use crate::media::MediaInfo;
use transcode_queue_config::Profile;

/// Progress is not trusted for the negative-compression check until the
/// encode is past this percentage; encoders write headers up front.
pub const NEGATIVE_COMPRESSION_GRACE_PERCENT: i64 = 5;

/// Normalized progress of one encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Whole percent of the source runtime encoded so far
    pub percent_done: i64,
    /// Whole percent the output is smaller than the matching share of the source
    pub percent_compression: i64,
}

/// Why an encode should be stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Output is already larger than the source it replaces
    NegativeCompression,
    /// Past the profile's check point and still below its threshold
    ThresholdUnreachable,
}

/// Converts an encoder sample into percentages.
///
/// Sources without a known runtime report 0% done, and nothing is estimated
/// until some of the source has been consumed.
pub fn calculate_progress(info: &MediaInfo, time_secs: f64, size_bytes: u64) -> Progress {
    let percent_done = if info.runtime_secs > 0 {
        (time_secs / info.runtime_secs as f64 * 100.0).floor() as i64
    } else {
        0
    };

    let expected_source_bytes = info.filesize_bytes as f64 * (percent_done as f64 / 100.0);
    if expected_source_bytes <= 0.0 {
        return Progress::default();
    }

    let percent_compression =
        100 - (size_bytes as f64 / expected_source_bytes * 100.0).floor() as i64;

    Progress {
        percent_done,
        percent_compression,
    }
}

/// Decides whether an encode should be stopped early.
pub fn abort_decision(profile: &Profile, progress: Progress) -> Option<AbortReason> {
    if progress.percent_compression < 0 && progress.percent_done > NEGATIVE_COMPRESSION_GRACE_PERCENT
    {
        return Some(AbortReason::NegativeCompression);
    }

    if profile.threshold_check < 100
        && progress.percent_done >= profile.threshold_check as i64
        && progress.percent_compression < profile.threshold as i64
    {
        return Some(AbortReason::ThresholdUnreachable);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use transcode_queue_config::ProcessorKind;

    fn media(runtime_secs: u64, filesize_bytes: u64) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("/media/film.mkv"),
            vcodec: "h264".to_string(),
            width: 1920,
            height: 1080,
            runtime_secs,
            filesize_bytes,
            fps: 24.0,
            streams: Vec::new(),
        }
    }

    fn profile(threshold: u32, threshold_check: u32) -> Profile {
        let mut profile = Profile::new("hevc", ProcessorKind::Ffmpeg, ".mkv");
        profile.threshold = threshold;
        profile.threshold_check = threshold_check;
        profile
    }

    #[test]
    fn test_halfway_progress() {
        let progress = calculate_progress(&media(1000, 1_000_000), 500.0, 300_000);
        assert_eq!(
            progress,
            Progress {
                percent_done: 50,
                percent_compression: 40,
            }
        );
    }

    #[test]
    fn test_unknown_runtime_reports_nothing() {
        assert_eq!(
            calculate_progress(&media(0, 1_000_000), 120.0, 5_000),
            Progress::default()
        );
    }

    #[test]
    fn test_start_of_encode_reports_nothing() {
        // under 1% done means no expected size yet
        assert_eq!(
            calculate_progress(&media(1000, 1_000_000), 5.0, 5_000),
            Progress::default()
        );
    }

    #[test]
    fn test_negative_compression_waits_for_grace() {
        let p = profile(0, 100);
        let early = Progress {
            percent_done: 5,
            percent_compression: -20,
        };
        let later = Progress {
            percent_done: 6,
            percent_compression: -1,
        };
        assert_eq!(abort_decision(&p, early), None);
        assert_eq!(abort_decision(&p, later), Some(AbortReason::NegativeCompression));
    }

    #[test]
    fn test_threshold_check_point() {
        let p = profile(20, 50);
        let before = Progress {
            percent_done: 49,
            percent_compression: 10,
        };
        let at = Progress {
            percent_done: 50,
            percent_compression: 10,
        };
        let good = Progress {
            percent_done: 80,
            percent_compression: 25,
        };
        assert_eq!(abort_decision(&p, before), None);
        assert_eq!(abort_decision(&p, at), Some(AbortReason::ThresholdUnreachable));
        assert_eq!(abort_decision(&p, good), None);
    }

    #[test]
    fn test_threshold_check_disabled_at_100() {
        let p = profile(90, 100);
        let progress = Progress {
            percent_done: 100,
            percent_compression: 10,
        };
        assert_eq!(abort_decision(&p, progress), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_percent_done_tracks_time(
            runtime in 1u64..100_000,
            filesize in 1u64..100_000_000_000,
            fraction in 0.0f64..1.0,
            size in 0u64..100_000_000_000,
        ) {
            let time = runtime as f64 * fraction;
            let progress = calculate_progress(&media(runtime, filesize), time, size);
            prop_assert!(progress.percent_done >= 0 && progress.percent_done <= 100);
            prop_assert!(progress.percent_compression <= 100);
            if progress.percent_done == 0 {
                prop_assert_eq!(progress.percent_compression, 0);
            }
        }

        #[test]
        fn prop_no_abort_while_compressing_well(
            threshold in 0u32..100,
            threshold_check in 0u32..=100,
            done in 0i64..=100,
        ) {
            let progress = Progress { percent_done: done, percent_compression: 100 };
            prop_assert_eq!(abort_decision(&profile(threshold, threshold_check), progress), None);
        }
    }
}
