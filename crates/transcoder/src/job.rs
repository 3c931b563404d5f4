//! Jobs and the candidates they are built from.

use crate::media::MediaInfo;
use std::path::PathBuf;
use transcode_queue_config::Profile;
use uuid::Uuid;

/// A file offered for transcoding, before it has been matched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub path: PathBuf,
    /// Profile chosen on the command line instead of by rules
    pub forced_profile: Option<String>,
    /// Mixin names appended to the profile's output options
    pub mixins: Vec<String>,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// A source file paired with the profile it will be encoded with.
///
/// Built once at enqueue time and never changed afterwards.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier
    pub id: Uuid,
    pub source_path: PathBuf,
    pub profile: Profile,
    pub mixins: Vec<String>,
    pub media_info: MediaInfo,
}

impl Job {
    pub fn new(
        source_path: PathBuf,
        profile: Profile,
        mixins: Vec<String>,
        media_info: MediaInfo,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            profile,
            mixins,
            media_info,
        }
    }

    /// File name for log lines and status reports.
    pub fn basename(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.to_string_lossy().into_owned())
    }
}
