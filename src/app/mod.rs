//! Application module
//!
//! Command-line level configuration and logging setup for the `sitecoord`
//! binary.

pub mod config;
pub mod logging;

pub use config::AppConfig;
pub use logging::init_logging;
