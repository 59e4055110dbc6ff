pub mod logging;

// Re-export common functions
pub use logging::{init_logging, default_log_file};
