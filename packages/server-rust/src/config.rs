//! Command-line configuration for the `courier` binary.
//!
//! Every flag can also be set through a `COURIER_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use courier_core::ContextConfig;

use crate::endpoints::FolderMonitorConfig;
use crate::logging::LoggingConfig;

/// Top-level configuration for the server.
#[derive(Debug, Clone, Parser)]
#[command(name = "courier", version, about = "Routes files from a folder through a pipeline")]
pub struct ServerConfig {
    /// Folder to monitor.
    #[arg(long, env = "COURIER_FOLDER")]
    pub folder: PathBuf,

    /// Glob matched against file names.
    #[arg(long, env = "COURIER_PATTERN", default_value = "*")]
    pub pattern: String,

    /// Also scan sub-folders.
    #[arg(long, env = "COURIER_RECURSIVE")]
    pub recursive: bool,

    /// Delete processed files instead of moving them to `.courier/`.
    #[arg(long, env = "COURIER_DELETE_ON_SUCCESS")]
    pub delete_on_success: bool,

    /// Minimum delay between two folder scans, in milliseconds.
    #[arg(long, env = "COURIER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// How long shutdown waits for registered tasks, in milliseconds.
    #[arg(long, env = "COURIER_SHUTDOWN_TIMEOUT_MS", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "COURIER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "COURIER_LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    #[must_use]
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            shutdown_timeout: self.shutdown_timeout(),
            ..ContextConfig::default()
        }
    }

    #[must_use]
    pub fn folder_monitor(&self) -> FolderMonitorConfig {
        FolderMonitorConfig::new(&self.folder)
            .with_pattern(&self.pattern)
            .with_recursive(self.recursive)
            .with_delete_on_success(self.delete_on_success)
    }

    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_core::ErrorPolicy;

    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::try_parse_from(["courier", "--folder", "/srv/inbox"]).unwrap();
        assert_eq!(config.folder, PathBuf::from("/srv/inbox"));
        assert_eq!(config.pattern, "*");
        assert!(!config.recursive);
        assert!(!config.delete_on_success);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
    }

    #[test]
    fn folder_is_required() {
        assert!(ServerConfig::try_parse_from(["courier"]).is_err());
    }

    #[test]
    fn derived_configs_follow_flags() {
        let config = ServerConfig::try_parse_from([
            "courier",
            "--folder",
            "/srv/inbox",
            "--pattern",
            "*.csv",
            "--recursive",
            "--delete-on-success",
            "--poll-interval-ms",
            "250",
            "--shutdown-timeout-ms",
            "5000",
            "--log-json",
        ])
        .unwrap();

        let monitor = config.folder_monitor();
        assert_eq!(monitor.folder, PathBuf::from("/srv/inbox"));
        assert_eq!(monitor.pattern, "*.csv");
        assert!(monitor.recursive);
        assert!(monitor.delete_on_success);

        let ctx = config.context_config();
        assert_eq!(ctx.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(ctx.recurring_error_policy, ErrorPolicy::Continue);

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert!(config.logging().json);
    }

    #[test]
    fn command_definition_is_valid() {
        use clap::CommandFactory;
        ServerConfig::command().debug_assert();
    }
}
