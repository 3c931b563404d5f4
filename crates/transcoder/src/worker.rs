//! Worker loop: drains one queue, one job at a time.
//!
//! Each job goes through encode, threshold check, then commit or discard.
//! A job that fails, or panics, is recorded in the shared error list and the
//! worker moves on to the next one.

use crate::catalog::{CatalogError, ProfileCatalog};
use crate::commit::{
    commit_output, prepare_destination_dir, resolve_destination, temp_output_path, CommitError,
};
use crate::job::Job;
use crate::processor::{EncodeRequest, ProcessorError, ProcessorSet, RunOutcome, Sample, Verdict};
use crate::progress::{abort_decision, calculate_progress, AbortReason};
use crate::queue::JobQueue;
use crate::stats::{RecordedError, RunTotals, SharedContext, WorkerResult};
use crate::status::{publish, StatusReport, LOCAL_HOST};
use crate::threshold::{filter_threshold, ThresholdResult};
use crate::units::size_delta_text;
use crossbeam_channel::Sender;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use transcode_queue_config::{ProcessorKind, Settings};

/// Error type for a single job
#[derive(Debug, Error)]
pub enum JobError {
    /// Processor could not be found, started or monitored
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Mixins named by the job are not configured
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    /// Encoder ended with a failure status
    #[error("Did not complete normally ({outcome:?}): {command}")]
    EncoderFailed { outcome: RunOutcome, command: String },

    /// Reading sizes from disk failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Moving the output or removing the source failed
    #[error("Commit failed: {0}")]
    Commit(#[from] CommitError),

    /// Processing panicked
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// How a job ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Committed {
        destination: PathBuf,
        original_bytes: u64,
        new_bytes: u64,
        elapsed: Duration,
    },
    /// Threshold missed, output thrown away
    Discarded { savings_percent: i64 },
    /// Stopped by the abort policy
    Aborted(AbortReason),
    /// Dry run, nothing executed
    DryRun,
}

/// Per-run knobs the worker needs from settings and the command line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSettings {
    pub tmp_dir: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub keep_original: bool,
    pub completed_suffix: String,
    pub automap: bool,
    pub dry_run: bool,
}

impl RunSettings {
    /// `keep_original` from the command line only ever turns keeping on.
    pub fn from_settings(settings: &Settings, keep_original: bool, dry_run: bool) -> Self {
        Self {
            tmp_dir: settings.tmp_dir.clone(),
            dest_dir: settings.dest_dir.clone(),
            keep_original: keep_original || settings.keep_original,
            completed_suffix: settings.completed_suffix.clone(),
            automap: settings.automap,
            dry_run,
        }
    }
}

/// Everything a worker shares with its siblings.
pub struct WorkerEnv {
    pub processors: ProcessorSet,
    pub catalog: Arc<dyn ProfileCatalog>,
    pub shared: Arc<SharedContext>,
    pub status: Sender<StatusReport>,
    pub settings: RunSettings,
}

/// Builds the encoder arguments for a job.
///
/// ffmpeg profiles get an explicit stream map for multi-stream sources when
/// both the global and the profile automap switches are on.
pub fn build_request(job: &Job, output: &Path, env: &WorkerEnv) -> Result<EncodeRequest, JobError> {
    let mut output_options = env.catalog.output_options(&job.profile, &job.mixins)?;

    let request = match job.profile.processor {
        ProcessorKind::Ffmpeg => {
            if env.settings.automap && job.profile.automap && job.media_info.is_multistream() {
                output_options.extend(job.media_info.ffmpeg_stream_map(&job.profile));
            }
            EncodeRequest::ffmpeg(
                &job.source_path,
                output,
                &job.profile.input_options,
                &output_options,
            )
        }
        ProcessorKind::Hbcli => EncodeRequest::hbcli(
            &job.source_path,
            output,
            &job.profile.input_options,
            &output_options,
        ),
    };
    Ok(request)
}

/// Removes a partial or rejected output. Failure is logged, never raised.
fn remove_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(file = %path.display(), "output removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "output NOT removed"),
    }
}

/// Sample consumer: progress, status publishing and the abort policy.
fn monitor_sample(
    job: &Job,
    sample: &Sample,
    status: &Sender<StatusReport>,
    abort_reason: &mut Option<AbortReason>,
) -> Verdict {
    match sample {
        Sample::Ffmpeg {
            time_secs,
            size_bytes,
            speed,
        } => {
            let progress = calculate_progress(&job.media_info, *time_secs, *size_bytes);
            publish(
                status,
                StatusReport {
                    host: LOCAL_HOST.to_string(),
                    file: job.basename(),
                    speed: *speed,
                    percent_compression: progress.percent_compression,
                    percent_done: progress.percent_done,
                },
            );
            tracing::debug!(
                done = progress.percent_done,
                compression = progress.percent_compression,
                speed = *speed,
                "progress"
            );

            match abort_decision(&job.profile, progress) {
                Some(reason) => {
                    match reason {
                        AbortReason::NegativeCompression => tracing::warn!(
                            compression = progress.percent_compression,
                            "encoding cancelled, negative compression"
                        ),
                        AbortReason::ThresholdUnreachable => tracing::warn!(
                            compression = progress.percent_compression,
                            threshold = job.profile.threshold,
                            "encoding cancelled, threshold not met"
                        ),
                    }
                    *abort_reason = Some(reason);
                    Verdict::Abort
                }
                None => Verdict::Continue,
            }
        }
        Sample::HandBrake { fps, eta_secs } => {
            tracing::debug!(avg_fps = *fps, eta_secs = *eta_secs, "progress");
            Verdict::Continue
        }
    }
}

/// Threshold check, then commit or discard.
fn finish_encode(
    job: &Job,
    output: &Path,
    elapsed: Duration,
    env: &WorkerEnv,
) -> Result<JobOutcome, JobError> {
    let source = &job.source_path;

    if let ThresholdResult::Fail {
        savings_percent, ..
    } = filter_threshold(&job.profile, source, output)?
    {
        tracing::warn!(
            savings = savings_percent,
            threshold = job.profile.threshold,
            "did not meet minimum savings threshold, output discarded"
        );
        env.shared.complete(source, elapsed);
        remove_output(output);
        return Ok(JobOutcome::Discarded { savings_percent });
    }

    let settings = &env.settings;
    let original_bytes = fs::metadata(source)?.len();
    let new_bytes = fs::metadata(output)?.len();

    let dest_dir = settings
        .dest_dir
        .as_deref()
        .map(|dir| prepare_destination_dir(dir, output));
    let destination = resolve_destination(
        source,
        &job.profile.extension,
        dest_dir.as_deref(),
        settings.keep_original,
        &settings.completed_suffix,
    );

    match commit_output(output, &destination, source, settings.keep_original) {
        Ok(()) => {}
        // the output is already in place, so the job still counts as done
        Err(e @ CommitError::RemoveSource { .. }) => {
            tracing::error!(error = %e, "output committed, source left behind");
            env.shared
                .record_error(RecordedError::new(Some(source), e.to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    env.shared.complete(source, elapsed);

    tracing::info!(
        dest = %destination.display(),
        delta = %size_delta_text(original_bytes, new_bytes),
        elapsed_secs = elapsed.as_secs(),
        original_kept = settings.keep_original,
        "finished"
    );

    Ok(JobOutcome::Committed {
        destination,
        original_bytes,
        new_bytes,
        elapsed,
    })
}

/// Runs one job end to end.
pub fn process_job(job: &Job, env: &WorkerEnv) -> Result<JobOutcome, JobError> {
    let output = temp_output_path(
        &job.source_path,
        &job.profile.extension,
        env.settings.tmp_dir.as_deref(),
    );
    let request = build_request(job, &output, env)?;
    let processor = env.processors.get(job.profile.processor)?;
    let command = request.args.join(" ");

    if env.settings.dry_run {
        tracing::info!(processor = %processor.kind(), command = %command, "dry run");
        return Ok(JobOutcome::DryRun);
    }

    tracing::info!(profile = %job.profile.name, output = %output.display(), "encoding");

    let started = Instant::now();
    let mut abort_reason = None;
    let run = {
        let mut monitor =
            |sample: &Sample| monitor_sample(job, sample, &env.status, &mut abort_reason);
        processor.run(&request, &mut monitor)
    };
    let elapsed = started.elapsed();

    let outcome = match run {
        Ok(outcome) => outcome,
        Err(e) => {
            remove_output(&output);
            return Err(e.into());
        }
    };

    if outcome.is_success() {
        return finish_encode(job, &output, elapsed, env);
    }
    match outcome {
        RunOutcome::Vetoed => {
            remove_output(&output);
            Ok(JobOutcome::Aborted(
                abort_reason.unwrap_or(AbortReason::ThresholdUnreachable),
            ))
        }
        failed => {
            tracing::error!(outcome = ?failed, command = %command, "did not complete normally");
            remove_output(&output);
            Err(JobError::EncoderFailed {
                outcome: failed,
                command,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drains `queue`, returning this worker's totals.
///
/// Runs until the queue is empty. Every dequeued job is marked done on every
/// path out of its iteration.
pub fn run_queue(queue: &JobQueue, env: &WorkerEnv) -> WorkerResult {
    let mut result = WorkerResult {
        queue: queue.name().to_string(),
        ..Default::default()
    };

    while let Some((job, _done)) = queue.pop() {
        let span = tracing::info_span!("job", id = %job.id, file = %job.basename());
        let _entered = span.enter();

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| process_job(&job, env)));
        let failure = match attempt {
            Ok(Ok(outcome)) => {
                match outcome {
                    JobOutcome::Committed {
                        original_bytes,
                        new_bytes,
                        elapsed,
                        ..
                    } => {
                        result.outcomes.committed += 1;
                        result.totals.merge(&RunTotals {
                            original_bytes,
                            new_bytes,
                            session_duration: elapsed,
                        });
                    }
                    JobOutcome::Discarded { .. } => result.outcomes.discarded += 1,
                    JobOutcome::Aborted(_) => result.outcomes.aborted += 1,
                    JobOutcome::DryRun => result.outcomes.skipped += 1,
                }
                None
            }
            Ok(Err(e)) => Some(e),
            Err(payload) => {
                let output = temp_output_path(
                    &job.source_path,
                    &job.profile.extension,
                    env.settings.tmp_dir.as_deref(),
                );
                remove_output(&output);
                Some(JobError::Panicked(panic_message(payload.as_ref())))
            }
        };

        if let Some(e) = failure {
            result.outcomes.failed += 1;
            tracing::error!(error = %e, "job failed");
            tracing::debug!(error = ?e, "job failure detail");
            env.shared
                .record_error(RecordedError::new(Some(&job.source_path), e.to_string()));
        }
    }

    tracing::debug!(queue = %result.queue, done = queue.done_count(), "queue drained");
    result
}
