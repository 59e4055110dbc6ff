use serde::{Serialize, Deserialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::crawler::summary::RunSummary;

/// Lifecycle events of an orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The backlog was fetched and workers are about to start
    Started {
        run_id: Uuid,
        backlog_size: usize,
        concurrency: usize,
    },
    /// There was nothing pending
    Empty { run_id: Uuid },
    /// All workers finished
    Completed { summary: RunSummary },
    /// The run aborted
    Failed { run_id: Uuid, error: String },
}

/// Receives run lifecycle events
pub trait RunObserver: Send + Sync {
    fn notify(&self, event: &RunEvent);
}

/// Writes run events to the log
#[derive(Debug, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn notify(&self, event: &RunEvent) {
        match event {
            RunEvent::Started { run_id, backlog_size, concurrency } => {
                info!(%run_id, "Run started: {} pending item(s), {} worker(s)", backlog_size, concurrency);
            }
            RunEvent::Empty { run_id } => {
                info!(%run_id, "No pending items");
            }
            RunEvent::Completed { summary } => {
                info!(
                    run_id = %summary.run_id,
                    "Run completed: {} attempted, {} succeeded, {} failed, {} skipped, {} retries",
                    summary.attempted, summary.succeeded, summary.failed, summary.skipped, summary.retries
                );
            }
            RunEvent::Failed { run_id, error } => {
                error!(%run_id, "Run failed: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let run_id = Uuid::nil();
        let json = serde_json::to_value(RunEvent::Empty { run_id }).unwrap();

        assert_eq!(json["type"], "empty");
        assert_eq!(json["run_id"], run_id.to_string());
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = crate::testing::RecordingObserver::new();
        let run_id = Uuid::new_v4();

        observer.notify(&RunEvent::Started { run_id, backlog_size: 3, concurrency: 2 });
        observer.notify(&RunEvent::Failed { run_id, error: "boom".into() });

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::Started { backlog_size: 3, .. }));
        assert!(matches!(events[1], RunEvent::Failed { .. }));
    }
}
