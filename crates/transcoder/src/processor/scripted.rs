//! In-process processor for tests.
//!
//! Behaves like an encoder without spawning anything: writes an output whose
//! size is a chosen fraction of the source, replays chosen samples and ends
//! with a chosen outcome. Behavior is picked per source file name.

use super::{EncodeRequest, Processor, ProcessorError, RunOutcome, Sample, Verdict};
use crate::media::{MediaInfo, ProbeError, StreamInfo, StreamKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use transcode_queue_config::ProcessorKind;

/// Runtime every scripted source reports
pub const SCRIPTED_RUNTIME_SECS: u64 = 100;

#[derive(Debug, Clone)]
pub struct Script {
    /// Output size as a fraction of the source size
    pub output_ratio: f64,
    /// None ends the run as if killed by a signal
    pub exit_code: Option<i32>,
    pub samples: Vec<Sample>,
    /// Probe reports no video stream
    pub invalid_media: bool,
    /// `run` panics after writing the output
    pub panic: bool,
    /// Leave the output path alone instead of writing to it
    pub skip_output: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            output_ratio: 0.5,
            exit_code: Some(0),
            samples: Vec::new(),
            invalid_media: false,
            panic: false,
            skip_output: false,
        }
    }
}

impl Script {
    pub fn ratio(output_ratio: f64) -> Self {
        Self {
            output_ratio,
            ..Default::default()
        }
    }
}

pub struct ScriptedProcessor {
    kind: ProcessorKind,
    scripts: HashMap<String, Script>,
    delay: Duration,
    runs: Mutex<Vec<EncodeRequest>>,
}

impl ScriptedProcessor {
    pub fn new(kind: ProcessorKind) -> Self {
        Self {
            kind,
            scripts: HashMap::new(),
            delay: Duration::from_millis(20),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Script for sources with this file name
    pub fn with_script(mut self, file_name: &str, script: Script) -> Self {
        self.scripts.insert(file_name.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests seen so far, in call order
    pub fn runs(&self) -> Vec<EncodeRequest> {
        self.runs.lock().clone()
    }

    fn script_for(&self, path: &Path) -> Script {
        path.file_name()
            .and_then(|n| self.scripts.get(&*n.to_string_lossy()))
            .cloned()
            .unwrap_or_default()
    }
}

impl Processor for ScriptedProcessor {
    fn kind(&self) -> ProcessorKind {
        self.kind
    }

    fn fetch_details(&self, path: &Path) -> Result<MediaInfo, ProcessorError> {
        let filesize_bytes = fs::metadata(path).map_err(ProbeError::Io)?.len();
        let script = self.script_for(path);

        let mut streams = vec![StreamInfo {
            index: 0,
            kind: StreamKind::Audio,
            codec_name: "aac".to_string(),
            language: Some("eng".to_string()),
        }];
        if !script.invalid_media {
            streams.insert(
                0,
                StreamInfo {
                    index: 0,
                    kind: StreamKind::Video,
                    codec_name: "h264".to_string(),
                    language: None,
                },
            );
            streams[1].index = 1;
        }

        Ok(MediaInfo {
            path: PathBuf::from(path),
            vcodec: if script.invalid_media { String::new() } else { "h264".to_string() },
            width: 1920,
            height: 1080,
            runtime_secs: SCRIPTED_RUNTIME_SECS,
            filesize_bytes,
            fps: 24.0,
            streams,
        })
    }

    fn run(
        &self,
        request: &EncodeRequest,
        on_sample: &mut dyn FnMut(&Sample) -> Verdict,
    ) -> Result<RunOutcome, ProcessorError> {
        self.runs.lock().push(request.clone());
        let script = self.script_for(&request.source);

        if !script.skip_output {
            let source_len = fs::metadata(&request.source)?.len();
            let output_len = (source_len as f64 * script.output_ratio).floor() as usize;
            fs::write(&request.output, vec![0u8; output_len])?;
        }

        if script.panic {
            panic!("scripted encoder crash for {}", request.source.display());
        }

        for sample in &script.samples {
            if on_sample(sample) == Verdict::Abort {
                return Ok(RunOutcome::Vetoed);
            }
        }

        thread::sleep(self.delay);

        Ok(match script.exit_code {
            Some(code) => RunOutcome::Exited(code),
            None => RunOutcome::Signalled,
        })
    }
}
