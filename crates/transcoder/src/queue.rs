//! FIFO job queue shared by the workers bound to it.

use crate::job::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A named FIFO of jobs.
///
/// Every job is handed out at most once. The done counter tracks finished
/// jobs; it is bumped when the [`DoneGuard`] returned with the job is
/// dropped, so it advances even if processing panics.
#[derive(Debug)]
pub struct JobQueue {
    name: String,
    jobs: Mutex<VecDeque<Job>>,
    done: AtomicUsize,
}

/// Marks its job done when dropped.
#[derive(Debug)]
pub struct DoneGuard<'a> {
    queue: &'a JobQueue,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done.fetch_add(1, Ordering::SeqCst);
    }
}

impl JobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(VecDeque::new()),
            done: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    /// Takes the next job, or None once the queue is drained.
    pub fn pop(&self) -> Option<(Job, DoneGuard<'_>)> {
        let job = self.jobs.lock().pop_front()?;
        Some((job, DoneGuard { queue: self }))
    }

    /// Jobs still waiting.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jobs handed out and finished.
    pub fn done_count(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}
