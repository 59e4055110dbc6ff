use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::crawler::error::StoreError;
use crate::crawler::task::WorkItem;
use crate::storage::BacklogStore;

/// Pages through the backlog store until it is exhausted
pub struct BacklogFetcher {
    store: Arc<dyn BacklogStore>,
    page_size: usize,
}

impl BacklogFetcher {
    pub fn new(store: Arc<dyn BacklogStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Fetch every pending item in ascending id order.
    ///
    /// A full page never ends the loop by itself; only a short or empty page
    /// does. Any page error fails the whole fetch. Items whose id does not
    /// strictly increase (rows shifting between pages while the store is being
    /// written to) are dropped so the result never holds duplicates.
    pub async fn fetch_all_pending(&self) -> Result<Vec<WorkItem>, StoreError> {
        let mut backlog: Vec<WorkItem> = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.store.page(offset, self.page_size).await?;
            let fetched = page.rows;
            debug!("Backlog page at offset {} returned {} row(s)", offset, fetched);

            for item in page.items {
                match backlog.last() {
                    Some(last) if item.id <= last.id => {
                        warn!(
                            "Dropping out-of-order backlog item {} (last id {})",
                            item.id, last.id
                        );
                    }
                    _ => backlog.push(item),
                }
            }

            if fetched < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        info!("Fetched {} pending item(s)", backlog.len());

        Ok(backlog)
    }
}
