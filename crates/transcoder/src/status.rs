//! Progress reports published by workers while they encode.

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;

/// Host name used in reports from this machine
pub const LOCAL_HOST: &str = "local";

/// Channel capacity; reports beyond it are dropped.
pub const STATUS_CHANNEL_CAPACITY: usize = 256;

/// One progress observation for an encode in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub host: String,
    pub file: String,
    pub speed: f32,
    pub percent_compression: i64,
    pub percent_done: i64,
}

/// Publishes without blocking. Returns false when the report was dropped.
pub fn publish(sender: &Sender<StatusReport>, report: StatusReport) -> bool {
    match sender.try_send(report) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::trace!("status channel full, report dropped");
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn report(percent_done: i64) -> StatusReport {
        StatusReport {
            host: LOCAL_HOST.to_string(),
            file: "film.mkv".to_string(),
            speed: 2.5,
            percent_compression: 30,
            percent_done,
        }
    }

    #[test]
    fn test_publish_drops_when_full() {
        let (tx, rx) = bounded(2);
        assert!(publish(&tx, report(1)));
        assert!(publish(&tx, report(2)));
        assert!(!publish(&tx, report(3)));

        let received: Vec<i64> = rx.try_iter().map(|r| r.percent_done).collect();
        assert_eq!(received, vec![1, 2]);
    }

    #[test]
    fn test_publish_without_receiver() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(!publish(&tx, report(1)));
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_string(&report(40)).unwrap();
        assert!(json.contains("\"host\":\"local\""));
        assert!(json.contains("\"percent_done\":40"));
    }
}
