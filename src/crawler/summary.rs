use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::crawler::task::ItemReport;

/// Final counts of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,

    /// Items in the fetched backlog
    pub backlog_size: usize,

    /// Items claimed by a worker
    pub attempted: usize,

    /// Items that produced a record
    pub succeeded: usize,

    /// Items never claimed because no worker was left to claim them
    pub skipped: usize,

    /// Items that ended in a failure
    pub failed: usize,

    /// Navigation retries consumed across all items
    pub retries: usize,

    /// Records written to the result store
    pub persisted: usize,

    /// Records the result store rejected
    pub persistence_failures: usize,

    /// Why the run stopped early, if it did
    pub terminal_error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn is_aborted(&self) -> bool {
        self.terminal_error.is_some()
    }
}

/// Concurrent counters behind a [`RunSummary`]
#[derive(Debug)]
pub struct SummaryCollector {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    backlog_size: AtomicUsize,
    attempted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    retries: AtomicUsize,
    persisted: AtomicUsize,
    persistence_failures: AtomicUsize,
    terminal_error: Mutex<Option<String>>,
}

impl SummaryCollector {
    /// Start collecting for a new run
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            backlog_size: AtomicUsize::new(0),
            attempted: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
            persisted: AtomicUsize::new(0),
            persistence_failures: AtomicUsize::new(0),
            terminal_error: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn set_backlog_size(&self, size: usize) {
        self.backlog_size.store(size, Ordering::SeqCst);
    }

    /// Count a claimed item
    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
    }

    /// Count the terminal outcome of a claimed item
    pub fn record_report(&self, report: &ItemReport) {
        if report.outcome.is_success() {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.retries.fetch_add(report.retries as usize, Ordering::SeqCst);
    }

    pub fn record_persisted(&self, count: usize) {
        self.persisted.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_persistence_failures(&self, count: usize) {
        self.persistence_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Mark the run as aborted
    pub fn abort(&self, error: impl Into<String>) {
        let mut terminal = self.terminal_error.lock().unwrap_or_else(|p| p.into_inner());
        *terminal = Some(error.into());
    }

    /// Current counts
    pub fn snapshot(&self) -> RunSummary {
        let backlog_size = self.backlog_size.load(Ordering::SeqCst);
        let attempted = self.attempted.load(Ordering::SeqCst);

        RunSummary {
            run_id: self.run_id,
            backlog_size,
            attempted,
            succeeded: self.succeeded.load(Ordering::SeqCst),
            skipped: backlog_size.saturating_sub(attempted),
            failed: self.failed.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            persistence_failures: self.persistence_failures.load(Ordering::SeqCst),
            terminal_error: self.terminal_error.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            started_at: self.started_at,
            finished_at: None,
        }
    }

    /// Final counts, stamped with the finish time
    pub fn finish(&self) -> RunSummary {
        RunSummary {
            finished_at: Some(Utc::now()),
            ..self.snapshot()
        }
    }
}

impl Default for SummaryCollector {
    fn default() -> Self {
        Self::new()
    }
}
