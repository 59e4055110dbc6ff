use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crawler::summary::SummaryCollector;
use crate::crawler::task::{ExtractedRecord, ItemOutcome, WorkItem};
use crate::storage::ResultStore;

/// When extracted records are written to the result store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Write each record as soon as it is extracted
    #[default]
    Streaming,
    /// Keep records in memory and write them all at the end of the run
    Batched,
}

impl std::str::FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" => Ok(Self::Streaming),
            "batched" => Ok(Self::Batched),
            other => Err(format!("unknown persistence policy '{}' (expected streaming or batched)", other)),
        }
    }
}

/// Receives item outcomes from workers and persists the records.
///
/// Store failures are logged and counted; they never stop the run.
pub struct ResultCollector {
    store: Arc<dyn ResultStore>,
    policy: PersistencePolicy,
    summary: Arc<SummaryCollector>,
    pending: Mutex<Vec<ExtractedRecord>>,
}

impl ResultCollector {
    pub fn new(store: Arc<dyn ResultStore>, policy: PersistencePolicy, summary: Arc<SummaryCollector>) -> Self {
        Self {
            store,
            policy,
            summary,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Take the outcome of one item
    pub async fn record(&self, item: &WorkItem, outcome: ItemOutcome) {
        let record = match outcome {
            ItemOutcome::Success(record) => record,
            ItemOutcome::Failure(reason) => {
                warn!(item_id = item.id, url = %item.target, "Item failed: {}", reason);
                return;
            }
        };

        match self.policy {
            PersistencePolicy::Streaming => match self.store.insert(&record).await {
                Ok(()) => {
                    debug!(item_id = item.id, "Record stored");
                    self.summary.record_persisted(1);
                }
                Err(e) => {
                    warn!(item_id = item.id, "Failed to store record: {}", e);
                    self.summary.record_persistence_failures(1);
                }
            },
            PersistencePolicy::Batched => {
                self.pending.lock().await.push(record);
            }
        }
    }

    /// Write out anything still held in memory; returns the number written
    pub async fn finalize(&self) -> usize {
        let records = std::mem::take(&mut *self.pending.lock().await);
        if records.is_empty() {
            return 0;
        }

        match self.store.insert_batch(&records).await {
            Ok(()) => {
                info!("Stored batch of {} record(s)", records.len());
                self.summary.record_persisted(records.len());
                records.len()
            }
            Err(e) => {
                warn!("Failed to store batch of {} record(s): {}", records.len(), e);
                self.summary.record_persistence_failures(records.len());
                0
            }
        }
    }
}
