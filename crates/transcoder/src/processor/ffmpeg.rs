//! ffmpeg processor
//!
//! Runs ffmpeg and turns its `size=... time=... speed=...x` status lines into
//! [`Sample::Ffmpeg`] values.

use super::{monitor_child, EncodeRequest, Processor, ProcessorError, RunOutcome, Sample, Verdict};
use crate::media::{probe_file, MediaInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use transcode_queue_config::ProcessorKind;

static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"size=\s*(\d+)\s*(kB|KiB|mB|MiB|B)?").expect("valid size regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex"));
static SPEED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"speed=\s*(\d+(?:\.\d+)?)x").expect("valid speed regex"));

/// Parses one ffmpeg status line.
///
/// Returns None for lines without both a size and a time, which covers the
/// banner, stream listing and the `N/A` lines printed while ffmpeg primes.
pub fn parse_status_line(line: &str) -> Option<Sample> {
    let size = SIZE_RE.captures(line)?;
    let time = TIME_RE.captures(line)?;

    let amount: u64 = size[1].parse().ok()?;
    // ffmpeg's kB is 1024 bytes
    let multiplier = match size.get(2).map(|m| m.as_str()) {
        Some("kB") | Some("KiB") => 1024,
        Some("mB") | Some("MiB") => 1024 * 1024,
        _ => 1,
    };

    let hours: f64 = time[1].parse().ok()?;
    let minutes: f64 = time[2].parse().ok()?;
    let seconds: f64 = time[3].parse().ok()?;

    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c[1].parse::<f32>().ok())
        .unwrap_or(0.0);

    Some(Sample::Ffmpeg {
        time_secs: hours * 3600.0 + minutes * 60.0 + seconds,
        size_bytes: amount.checked_mul(multiplier)?,
        speed,
    })
}

/// ffmpeg-backed processor
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegProcessor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

impl Processor for FfmpegProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Ffmpeg
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
            command = %format!("{} {}", self.ffmpeg.display(), request.args.join(" ")),
            "starting ffmpeg"
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessorError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        let Some(stderr) = child.stderr.take() else {
            return Ok(RunOutcome::from_status(child.wait()?));
        };

        monitor_child(child, stderr, parse_status_line, on_sample)
    }
}
