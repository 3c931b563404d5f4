//! Worker sizing for queues.

/// Queue used by profiles that do not name one. Always runs one worker.
pub const DEFAULT_QUEUE: &str = "_default_";

/// Number of worker threads to start for a queue.
///
/// - 0 for an empty queue
/// - 1 for the default queue, or every queue when running sequentially
/// - otherwise the configured maximum, capped at the number of queued jobs
///
/// A configured maximum of 0 is treated as 1.
pub fn worker_count(queue: &str, configured_max: u32, queued: usize, sequential: bool) -> usize {
    if queued == 0 {
        return 0;
    }
    if queue == DEFAULT_QUEUE || sequential {
        return 1;
    }
    (configured_max.max(1) as usize).min(queued)
}
