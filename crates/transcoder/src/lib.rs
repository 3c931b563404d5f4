//! Transcode Queue
//!
//! Local job-queue scheduler for batch transcoding: matches files to
//! profiles, runs one encoder process per job on per-queue worker threads,
//! aborts encodes that cannot meet their savings goal, and commits accepted
//! output in place of the source.

pub mod catalog;
pub mod commit;
pub mod concurrency;
pub mod dispatcher;
pub mod job;
pub mod media;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod queue_file;
pub mod scan;
pub mod stats;
pub mod status;
pub mod threshold;
pub mod units;
pub mod worker;

pub use transcode_queue_config as config;
pub use transcode_queue_config::Config;
pub use catalog::{CatalogError, ProfileCatalog};
pub use commit::CommitError;
pub use concurrency::{worker_count, DEFAULT_QUEUE};
pub use dispatcher::{DispatchError, PoolOptions, QueuePool};
pub use job::{Candidate, Job};
pub use media::{MediaInfo, ProbeError};
pub use processor::{
    EncodeRequest, FfmpegProcessor, HandBrakeProcessor, Processor, ProcessorError, ProcessorSet,
    RunOutcome, Sample, Verdict,
};
pub use progress::{abort_decision, calculate_progress, AbortReason, Progress};
pub use queue_file::{cleanup_queuefile, files_from_file, QueueFileAction, QueueFileError};
pub use scan::expand_inputs;
pub use stats::{
    format_completion_report, CompletionRecord, RecordedError, RunSummary, RunTotals,
    SharedContext, WorkerResult,
};
pub use status::StatusReport;
pub use threshold::{filter_threshold, is_exceeded_threshold, ThresholdResult};
pub use units::{auto_convert_unit, convert_unit, size_delta_text, SizeError, SizeUnit};
pub use worker::{JobError, JobOutcome, RunSettings};
