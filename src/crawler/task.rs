use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use url::Url;

use crate::crawler::error::ExtractionError;

/// A single page to collect, as stored in the backlog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable ordering key assigned by the store
    pub id: i64,

    /// Page to navigate to
    pub target: Url,

    /// Free-form label the row was registered with (if any)
    pub source_label: Option<String>,
}

/// Product fields read off a rendered page by a site extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Product {
    pub product_id: String,
    pub title: String,
    pub image: String,

    /// Price in minor currency units
    pub price: i64,

    pub model_name: String,
    pub shipping_fee: i64,
    pub return_fee: i64,
    pub sold_out: bool,
}

/// A product captured for a work item, ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Work item this record was captured from
    pub work_item_id: i64,

    pub product_id: String,
    pub title: String,
    pub image: String,
    pub price: i64,
    pub model_name: String,
    pub shipping_fee: i64,
    pub return_fee: i64,
    pub sold_out: bool,

    /// Timestamp when the page was read
    pub captured_at: DateTime<Utc>,
}

impl ExtractedRecord {
    /// Stamp a product with the work item it came from and the capture time
    pub fn capture(work_item_id: i64, product: Product) -> Self {
        Self {
            work_item_id,
            product_id: product.product_id,
            title: product.title,
            image: product.image,
            price: product.price,
            model_name: product.model_name,
            shipping_fee: product.shipping_fee,
            return_fee: product.return_fee,
            sold_out: product.sold_out,
            captured_at: Utc::now(),
        }
    }
}

/// Why a work item did not produce a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No extractor is registered for the target's domain
    UnsupportedDomain(String),

    /// The worker could not obtain a session to run the item on
    SessionUnavailable(String),

    /// Every navigation attempt errored or timed out
    NavigationFailed {
        attempts: u32,
        last_error: String,
    },

    /// The page loaded but the extractor failed or never answered
    Extraction(ExtractionError),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::UnsupportedDomain(host) => write!(f, "unsupported domain: {}", host),
            FailureReason::SessionUnavailable(e) => write!(f, "no session available: {}", e),
            FailureReason::NavigationFailed { attempts, last_error } => {
                write!(f, "navigation failed after {} attempt(s): {}", attempts, last_error)
            }
            FailureReason::Extraction(e) => write!(f, "extraction failed: {}", e),
        }
    }
}

/// Terminal outcome of one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success(ExtractedRecord),
    Failure(FailureReason),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }
}

/// Outcome of an item together with the navigation retries it consumed
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub outcome: ItemOutcome,
    pub retries: u32,
}

impl ItemReport {
    pub fn new(outcome: ItemOutcome, retries: u32) -> Self {
        Self { outcome, retries }
    }
}
