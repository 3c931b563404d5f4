//! Queue pool: routes matched files into named queues, runs a worker thread
//! per queue slot and waits for all of them to drain.

use crate::catalog::ProfileCatalog;
use crate::concurrency::{worker_count, DEFAULT_QUEUE};
use crate::job::{Candidate, Job};
use crate::processor::ProcessorSet;
use crate::queue::JobQueue;
use crate::stats::{RecordedError, RunSummary, SharedContext, WorkerResult};
use crate::status::{StatusReport, STATUS_CHANNEL_CAPACITY};
use crate::worker::{run_queue, RunSettings, WorkerEnv};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use transcode_queue_config::{Config, ProcessorKind};

/// Fatal configuration errors found while routing files.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// A profile was requested by name and does not exist
    #[error("Profile \"{0}\" is not defined")]
    UnknownProfile(String),

    /// A profile routes to a queue missing from `[queues]`
    #[error("Profile \"{profile}\" uses queue \"{queue}\" which is not declared in [queues]")]
    UndeclaredQueue { profile: String, queue: String },
}

/// Options for one run of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub dry_run: bool,
    /// Keep sources even when the config says otherwise
    pub keep_original: bool,
    /// Cap every queue at a single worker
    pub sequential: bool,
    /// How long the wait loop blocks on the status channel between liveness checks
    pub poll_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            keep_original: false,
            sequential: false,
            poll_interval: Duration::from_millis(2000),
        }
    }
}

/// Owns the queues of a run and the state shared by its workers.
pub struct QueuePool {
    config: Arc<Config>,
    processors: ProcessorSet,
    shared: Arc<SharedContext>,
    queues: BTreeMap<String, Arc<JobQueue>>,
    options: PoolOptions,
}

impl QueuePool {
    pub fn new(config: Config, processors: ProcessorSet, options: PoolOptions) -> Self {
        let mut queues = BTreeMap::new();
        queues.insert(
            DEFAULT_QUEUE.to_string(),
            Arc::new(JobQueue::new(DEFAULT_QUEUE)),
        );
        for name in config.queues.keys() {
            queues.insert(name.clone(), Arc::new(JobQueue::new(name.as_str())));
        }

        Self {
            config: Arc::new(config),
            processors,
            shared: SharedContext::new(),
            queues,
            options,
        }
    }

    /// Completion and error lists of this run.
    pub fn shared(&self) -> Arc<SharedContext> {
        Arc::clone(&self.shared)
    }

    /// Matches candidates to profiles and queues them.
    ///
    /// Files that are missing, cannot be probed, carry no video, or match no
    /// rule are skipped with a warning. Files matching a skip rule are
    /// recorded as completed (except in dry-run). Returns how many jobs were
    /// queued.
    ///
    /// # Errors
    ///
    /// An unknown forced profile, or a profile naming an undeclared queue,
    /// stops routing immediately.
    pub fn enqueue_files(&mut self, candidates: &[Candidate]) -> Result<usize, DispatchError> {
        let mut queued = 0;

        for candidate in candidates {
            if !candidate.path.exists() {
                tracing::warn!(file = %candidate.path.display(), "file not found, skipping");
                continue;
            }
            // jobs always carry absolute source paths
            let path = match std::path::absolute(&candidate.path) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(file = %candidate.path.display(), error = %e, "cannot resolve path, skipping");
                    continue;
                }
            };
            let path = &path;

            let forced = match &candidate.forced_profile {
                Some(name) => Some(
                    self.config
                        .get_profile(name)
                        .cloned()
                        .ok_or_else(|| DispatchError::UnknownProfile(name.clone()))?,
                ),
                None => None,
            };

            let kind = forced
                .as_ref()
                .map(|p| p.processor)
                .unwrap_or(ProcessorKind::Ffmpeg);
            let details = self
                .processors
                .get(kind)
                .and_then(|processor| processor.fetch_details(path));
            let media_info = match details {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "cannot read media details, skipping");
                    self.shared
                        .record_error(RecordedError::new(Some(path), e.to_string()));
                    continue;
                }
            };
            if !media_info.is_valid() {
                tracing::warn!(file = %path.display(), "no video stream found, skipping");
                continue;
            }

            let profile = match forced {
                Some(profile) => profile,
                None => {
                    let Some(rule) = self.config.match_rule(&media_info) else {
                        tracing::info!(file = %path.display(), "no matching rule, skipping");
                        continue;
                    };
                    if rule.is_skip() {
                        tracing::info!(file = %path.display(), rule = %rule.name, "skipped by rule");
                        if !self.options.dry_run {
                            self.shared.complete(path, Duration::ZERO);
                        }
                        continue;
                    }
                    let name = rule.profile.clone().unwrap_or_default();
                    self.config
                        .get_profile(&name)
                        .cloned()
                        .ok_or(DispatchError::UnknownProfile(name))?
                }
            };

            let queue_name = match &profile.queue {
                Some(queue) if self.config.has_queue(queue) => queue.clone(),
                Some(queue) => {
                    return Err(DispatchError::UndeclaredQueue {
                        profile: profile.name.clone(),
                        queue: queue.clone(),
                    })
                }
                None => DEFAULT_QUEUE.to_string(),
            };

            tracing::info!(
                file = %path.display(),
                profile = %profile.name,
                queue = %queue_name,
                "queued"
            );
            let job = Job::new(path.clone(), profile, candidate.mixins.clone(), media_info);
            self.queues
                .entry(queue_name.clone())
                .or_insert_with(|| Arc::new(JobQueue::new(queue_name)))
                .push(job);
            queued += 1;
        }

        Ok(queued)
    }

    /// Worker threads each non-empty queue will get.
    pub fn plan(&self) -> BTreeMap<String, usize> {
        self.queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(name, queue)| {
                let max = self.config.queue_limit(name).unwrap_or(1);
                let count = worker_count(name, max, queue.len(), self.options.sequential);
                (name.clone(), count)
            })
            .collect()
    }

    /// Runs every queued job and blocks until all workers are done.
    pub fn start(self) -> RunSummary {
        let plan = self.plan();
        let (status_tx, status_rx) = bounded::<StatusReport>(STATUS_CHANNEL_CAPACITY);

        let env = Arc::new(WorkerEnv {
            processors: self.processors.clone(),
            catalog: Arc::clone(&self.config) as Arc<dyn ProfileCatalog>,
            shared: Arc::clone(&self.shared),
            status: status_tx,
            settings: RunSettings::from_settings(
                &self.config.settings,
                self.options.keep_original,
                self.options.dry_run,
            ),
        });

        let mut handles: Vec<(String, JoinHandle<WorkerResult>)> = Vec::new();
        for (name, count) in &plan {
            let Some(queue) = self.queues.get(name) else {
                continue;
            };
            tracing::info!(queue = %name, workers = count, jobs = queue.len(), "starting queue");

            for slot in 0..*count {
                let queue = Arc::clone(queue);
                let env = Arc::clone(&env);
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", name, slot))
                    .spawn(move || run_queue(&queue, &env));
                match spawned {
                    Ok(handle) => handles.push((name.clone(), handle)),
                    Err(e) => {
                        tracing::error!(queue = %name, error = %e, "failed to start worker");
                        self.shared.record_error(RecordedError::new(
                            None,
                            format!("failed to start worker for queue {}: {}", name, e),
                        ));
                    }
                }
            }
        }
        // workers hold the only senders from here on
        drop(env);

        loop {
            match status_rx.recv_timeout(self.options.poll_interval) {
                Ok(report) => {
                    tracing::trace!(
                        host = %report.host,
                        file = %report.file,
                        done = report.percent_done,
                        compression = report.percent_compression,
                        "status"
                    );
                }
                Err(RecvTimeoutError::Timeout) => {
                    if handles.iter().all(|(_, handle)| handle.is_finished()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut summary = RunSummary::default();
        for (queue, handle) in handles {
            match handle.join() {
                Ok(result) => summary.merge_worker(&result),
                Err(_) => {
                    tracing::error!(queue = %queue, "worker thread panicked");
                    self.shared.record_error(RecordedError::new(
                        None,
                        format!("worker for queue {} panicked", queue),
                    ));
                }
            }
        }

        summary.completed = self.shared.completed();
        summary.errors = self.shared.errors();
        tracing::info!(
            committed = summary.outcomes.committed,
            discarded = summary.outcomes.discarded,
            failed = summary.outcomes.failed,
            "all queues drained"
        );
        summary
    }
}
