//! Courier host: the folder monitor producer, the console step, CLI
//! configuration and logging setup for the `courier` binary.

pub mod config;
pub mod endpoints;
pub mod logging;

pub use config::ServerConfig;
pub use endpoints::{ConsoleStep, FileInformation, FolderMonitor, FolderMonitorConfig};
pub use logging::LoggingConfig;
