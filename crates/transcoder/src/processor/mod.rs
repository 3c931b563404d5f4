//! External encoder processes.
//!
//! A [`Processor`] runs one encode and feeds every progress [`Sample`] it can
//! parse from the encoder's console output to a caller-supplied consumer. The
//! consumer answers with a [`Verdict`]; `Verdict::Abort` kills the process and
//! no further samples are delivered.

pub mod ffmpeg;
pub mod hbcli;
#[cfg(test)]
pub(crate) mod scripted;

pub use ffmpeg::FfmpegProcessor;
pub use hbcli::HandBrakeProcessor;

use crate::media::{MediaInfo, ProbeError};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use thiserror::Error;
use transcode_queue_config::ProcessorKind;

/// Error type for processor operations
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The encoder binary could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Metadata probe failed
    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// No processor is configured for the requested kind
    #[error("No processor available for {0}")]
    Unavailable(ProcessorKind),

    /// IO error while monitoring the process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One progress observation parsed from encoder output.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// ffmpeg status line
    Ffmpeg {
        /// Media time encoded so far, in seconds
        time_secs: f64,
        /// Bytes written to the output so far
        size_bytes: u64,
        /// Encode speed relative to realtime
        speed: f32,
    },
    /// HandBrakeCLI status line
    HandBrake { fps: f32, eta_secs: u64 },
}

/// Answer returned by a sample consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort,
}

/// How an encoder invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process exited on its own with this status code
    Exited(i32),
    /// Process was killed because the consumer returned `Verdict::Abort`
    Vetoed,
    /// Process was terminated by a signal it did not get from us
    Signalled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }

    pub(crate) fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => RunOutcome::Exited(code),
            None => RunOutcome::Signalled,
        }
    }
}

/// Everything needed to run one encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    /// Full argument vector, excluding the program itself
    pub args: Vec<String>,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl EncodeRequest {
    /// Argument vector for ffmpeg-style encoders.
    ///
    /// `-y -i <source> <input options> <output> <output options>`
    pub fn ffmpeg(
        source: &Path,
        output: &Path,
        input_options: &[String],
        output_options: &[String],
    ) -> Self {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
        ];
        args.extend(input_options.iter().cloned());
        args.push(output.to_string_lossy().into_owned());
        args.extend(output_options.iter().cloned());

        Self {
            args,
            source: source.to_path_buf(),
            output: output.to_path_buf(),
        }
    }

    /// Argument vector for HandBrakeCLI.
    ///
    /// `-i <source> <input options> <output options> -o <output>`
    pub fn hbcli(
        source: &Path,
        output: &Path,
        input_options: &[String],
        output_options: &[String],
    ) -> Self {
        let mut args = vec!["-i".to_string(), source.to_string_lossy().into_owned()];
        args.extend(input_options.iter().cloned());
        args.extend(output_options.iter().cloned());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());

        Self {
            args,
            source: source.to_path_buf(),
            output: output.to_path_buf(),
        }
    }
}

/// An external encoder.
pub trait Processor: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    /// Collects metadata about a source file.
    fn fetch_details(&self, path: &Path) -> Result<MediaInfo, ProcessorError>;

    /// Runs one encode, blocking until the process ends.
    ///
    /// `on_sample` is called for every parsed progress sample; returning
    /// `Verdict::Abort` kills the process and yields `RunOutcome::Vetoed`.
    fn run(
        &self,
        request: &EncodeRequest,
        on_sample: &mut dyn FnMut(&Sample) -> Verdict,
    ) -> Result<RunOutcome, ProcessorError>;
}

/// The processors available to a run, looked up by kind.
#[derive(Clone)]
pub struct ProcessorSet {
    ffmpeg: Option<Arc<dyn Processor>>,
    hbcli: Option<Arc<dyn Processor>>,
}

impl ProcessorSet {
    pub fn new(ffmpeg: Option<Arc<dyn Processor>>, hbcli: Option<Arc<dyn Processor>>) -> Self {
        Self { ffmpeg, hbcli }
    }

    /// Real ffmpeg and HandBrakeCLI processors from configured binary paths.
    pub fn from_settings(settings: &transcode_queue_config::Settings) -> Self {
        Self {
            ffmpeg: Some(Arc::new(FfmpegProcessor::new(
                settings.ffmpeg.clone(),
                settings.ffprobe.clone(),
            ))),
            hbcli: Some(Arc::new(HandBrakeProcessor::new(
                settings.hbcli.clone(),
                settings.ffprobe.clone(),
            ))),
        }
    }

    pub fn get(&self, kind: ProcessorKind) -> Result<Arc<dyn Processor>, ProcessorError> {
        let found = match kind {
            ProcessorKind::Ffmpeg => self.ffmpeg.as_ref(),
            ProcessorKind::Hbcli => self.hbcli.as_ref(),
        };
        found.cloned().ok_or(ProcessorError::Unavailable(kind))
    }
}

/// Reads encoder console output as lines split on either `\r` or `\n`.
///
/// Encoders redraw their status line with carriage returns, so plain
/// `BufRead::lines` would only yield it once the process exits.
pub struct ConsoleLines<R: Read> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> ConsoleLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }
}

impl<R: Read> Iterator for ConsoleLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let (consumed, found_break) = {
                let available = match self.reader.fill_buf() {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => return None,
                };
                if available.is_empty() {
                    if self.buf.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    return Some(line);
                }
                match available.iter().position(|b| *b == b'\r' || *b == b'\n') {
                    Some(pos) => {
                        self.buf.extend_from_slice(&available[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        self.buf.extend_from_slice(available);
                        (available.len(), false)
                    }
                }
            };
            self.reader.consume(consumed);

            if found_break {
                if self.buf.is_empty() {
                    // \r\n pairs and blank lines
                    continue;
                }
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                return Some(line);
            }
        }
    }
}

/// Feeds parsed samples from a running child to the consumer and settles
/// the outcome. Shared by every process-backed processor.
pub(crate) fn monitor_child<R, P>(
    mut child: Child,
    output: R,
    parse: P,
    on_sample: &mut dyn FnMut(&Sample) -> Verdict,
) -> Result<RunOutcome, ProcessorError>
where
    R: Read,
    P: Fn(&str) -> Option<Sample>,
{
    for line in ConsoleLines::new(output) {
        tracing::trace!(line = %line, "encoder output");
        let Some(sample) = parse(&line) else {
            continue;
        };
        if on_sample(&sample) == Verdict::Abort {
            // already-exited children make kill fail; the wait below still reaps them
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutcome::Vetoed);
        }
    }

    let status = child.wait()?;
    Ok(RunOutcome::from_status(status))
}
