pub mod postgres;

use async_trait::async_trait;

use crate::crawler::error::StoreError;
use crate::crawler::task::{ExtractedRecord, WorkItem};

// Re-export common types
pub use postgres::PostgresStore;

/// One page of the backlog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacklogPage {
    /// Usable items, in ascending id order
    pub items: Vec<WorkItem>,

    /// Rows the query returned, including any that could not be used
    pub rows: usize,
}

impl From<Vec<WorkItem>> for BacklogPage {
    fn from(items: Vec<WorkItem>) -> Self {
        Self {
            rows: items.len(),
            items,
        }
    }
}

/// Source of pending work items, paged in ascending id order
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// Fetch up to `limit` items starting at `offset`, ordered by id ascending
    async fn page(&self, offset: usize, limit: usize) -> Result<BacklogPage, StoreError>;
}

/// Destination for extracted records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a single record
    async fn insert(&self, record: &ExtractedRecord) -> Result<(), StoreError>;

    /// Persist many records in one write
    async fn insert_batch(&self, records: &[ExtractedRecord]) -> Result<(), StoreError>;
}
