//! HandBrakeCLI processor

use super::{monitor_child, EncodeRequest, Processor, ProcessorError, RunOutcome, Sample, Verdict};
use crate::media::{probe_file, MediaInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use transcode_queue_config::ProcessorKind;

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Encoding: task \d+ of \d+, [\d.]+ % \(.*?avg ([\d.]+) fps, ETA (\d+)h(\d+)m(\d+)s\)")
        .expect("valid progress regex")
});

/// Parses `Encoding: task 1 of 1, 5.00 % (31.2 fps, avg 30.1 fps, ETA 00h10m05s)`.
///
/// HandBrake prints the plain `Encoding: task 1 of 1, 0.12 %` form until it has
/// enough frames for an average; those lines yield nothing.
pub fn parse_progress_line(line: &str) -> Option<Sample> {
    let caps = PROGRESS_RE.captures(line)?;
    let fps: f32 = caps[1].parse().ok()?;
    let hours: u64 = caps[2].parse().ok()?;
    let minutes: u64 = caps[3].parse().ok()?;
    let seconds: u64 = caps[4].parse().ok()?;

    Some(Sample::HandBrake {
        fps,
        eta_secs: hours * 3600 + minutes * 60 + seconds,
    })
}

/// HandBrakeCLI-backed processor. Metadata still comes from ffprobe.
#[derive(Debug, Clone)]
pub struct HandBrakeProcessor {
    hbcli: PathBuf,
    ffprobe: PathBuf,
}

impl HandBrakeProcessor {
    pub fn new(hbcli: PathBuf, ffprobe: PathBuf) -> Self {
        Self { hbcli, ffprobe }
    }
}

impl Processor for HandBrakeProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Hbcli
    }

    fn fetch_details(&self, path: &Path) -> Result<MediaInfo, ProcessorError> {
        Ok(probe_file(&self.ffprobe, path)?)
    }

    fn run(
        &self,
        request: &EncodeRequest,
        on_sample: &mut dyn FnMut(&Sample) -> Verdict,
    ) -> Result<RunOutcome, ProcessorError> {
        tracing::debug!(
            command = %format!("{} {}", self.hbcli.display(), request.args.join(" ")),
            "starting HandBrakeCLI"
        );

        // progress goes to stdout, the log chatter to stderr
        let mut child = Command::new(&self.hbcli)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProcessorError::Spawn {
                program: self.hbcli.display().to_string(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Ok(RunOutcome::from_status(child.wait()?));
        };

        monitor_child(child, stdout, parse_progress_line, on_sample)
    }
}
