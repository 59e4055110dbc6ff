pub mod backlog;
pub mod collector;
pub mod controller;
pub mod error;
pub mod events;
pub mod navigation;
pub mod pool;
pub mod summary;
pub mod task;

// Re-export common types
pub use controller::CrawlerController;
pub use summary::RunSummary;
