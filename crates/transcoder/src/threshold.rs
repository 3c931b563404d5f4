//! Threshold Module
//!
//! Post-encode validation ensuring the output saved at least the profile's
//! minimum percentage over the original.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use transcode_queue_config::Profile;

/// Result of the threshold check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ThresholdResult {
    /// Output saved enough (or the check is disabled)
    Pass,
    /// Output did not save enough to be worth keeping
    Fail {
        original_bytes: u64,
        output_bytes: u64,
        savings_percent: i64,
    },
}

/// Whole-percent savings of `new_bytes` relative to `original_bytes`.
///
/// `100 - floor(new * 100 / original)`; negative when the output grew.
/// An empty original counts as 0% savings.
pub fn percent_savings(original_bytes: u64, new_bytes: u64) -> i64 {
    if original_bytes == 0 {
        return 0;
    }
    let ratio = (new_bytes as u128 * 100) / original_bytes as u128;
    100 - ratio.min(i64::MAX as u128) as i64
}

/// True when the savings meet or beat `threshold` percent.
///
/// # Arguments
/// * `threshold` - Minimum required percent size reduction
/// * `original_bytes` - Size of the source file in bytes
/// * `new_bytes` - Size of the encoded output in bytes
pub fn is_exceeded_threshold(threshold: u32, original_bytes: u64, new_bytes: u64) -> bool {
    percent_savings(original_bytes, new_bytes) >= threshold as i64
}

/// Checks the sizes on disk against the profile's threshold.
///
/// A threshold of 0 disables the check without touching the filesystem.
pub fn filter_threshold(
    profile: &Profile,
    source: &Path,
    output: &Path,
) -> std::io::Result<ThresholdResult> {
    if profile.threshold == 0 {
        return Ok(ThresholdResult::Pass);
    }

    let original_bytes = fs::metadata(source)?.len();
    let output_bytes = fs::metadata(output)?.len();

    if is_exceeded_threshold(profile.threshold, original_bytes, output_bytes) {
        Ok(ThresholdResult::Pass)
    } else {
        Ok(ThresholdResult::Fail {
            original_bytes,
            output_bytes,
            savings_percent: percent_savings(original_bytes, output_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use transcode_queue_config::ProcessorKind;

    fn profile_with_threshold(threshold: u32) -> Profile {
        let mut profile = Profile::new("test", ProcessorKind::Ffmpeg, ".mkv");
        profile.threshold = threshold;
        profile
    }

    #[test]
    fn test_percent_savings_examples() {
        assert_eq!(percent_savings(1000, 850), 15);
        assert_eq!(percent_savings(1000, 950), 5);
        assert_eq!(percent_savings(1000, 1000), 0);
        assert_eq!(percent_savings(1000, 1500), -50);
        assert_eq!(percent_savings(0, 500), 0);
        // floor of the kept ratio, so 84.9% kept is 16% saved
        assert_eq!(percent_savings(1000, 849), 16);
    }

    #[test]
    fn test_filter_threshold_reads_sizes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mkv");
        let output = dir.path().join("a.mkv.tmp");
        fs::write(&source, vec![0u8; 1000]).unwrap();
        fs::write(&output, vec![0u8; 950]).unwrap();

        let result = filter_threshold(&profile_with_threshold(10), &source, &output).unwrap();
        assert_eq!(
            result,
            ThresholdResult::Fail {
                original_bytes: 1000,
                output_bytes: 950,
                savings_percent: 5,
            }
        );

        fs::write(&output, vec![0u8; 850]).unwrap();
        let result = filter_threshold(&profile_with_threshold(10), &source, &output).unwrap();
        assert_eq!(result, ThresholdResult::Pass);
    }

    #[test]
    fn test_filter_threshold_missing_output_is_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mkv");
        fs::write(&source, b"data").unwrap();

        let result = filter_threshold(&profile_with_threshold(10), &source, &dir.path().join("gone"));
        assert!(result.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_zero_threshold_always_passes(
            original in 0u64..u64::MAX / 2,
            output in 0u64..u64::MAX / 2,
        ) {
            // paths do not exist; a disabled check must not look at them
            let result = filter_threshold(
                &profile_with_threshold(0),
                Path::new("/nonexistent/source.mkv"),
                Path::new("/nonexistent/output.mkv"),
            );
            prop_assert!(matches!(result, Ok(ThresholdResult::Pass)));
            prop_assert!(is_exceeded_threshold(0, original, output.min(original)));
        }

        #[test]
        fn prop_threshold_matches_savings(
            original in 1u64..1_000_000_000_000,
            kept_permille in 0u64..1000,
            threshold in 1u32..100,
        ) {
            let output = original * kept_permille / 1000;
            let savings = percent_savings(original, output);
            prop_assert_eq!(
                is_exceeded_threshold(threshold, original, output),
                savings >= threshold as i64
            );
        }

        #[test]
        fn prop_more_savings_never_fails_lower_threshold(
            original in 1u64..1_000_000_000,
            output in 0u64..1_000_000_000,
            threshold in 1u32..100,
        ) {
            let output = output.min(original);
            if is_exceeded_threshold(threshold, original, output) {
                prop_assert!(is_exceeded_threshold(threshold - 1, original, output));
                prop_assert!(is_exceeded_threshold(threshold, original, output.saturating_sub(1)));
            }
        }
    }
}
