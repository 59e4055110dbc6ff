pub mod host;
pub mod session;
pub mod signals;

// Re-export common types
pub use host::SessionHost;
pub use session::WebDriverHost;
pub use signals::NavigationSignals;
