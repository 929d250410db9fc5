//! Producers and terminal steps that connect routes to the outside world.

pub mod console;
pub mod folder;

pub use console::ConsoleStep;
pub use folder::{FileInformation, FolderMonitor, FolderMonitorConfig, FolderMonitorError};
