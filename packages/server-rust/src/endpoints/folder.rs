//! Folder monitor producer.
//!
//! Each scan enumerates the files of a folder, wraps each one as a
//! `Message<String>` annotated with [`FileInformation`], and dispatches it
//! through the context. The completion callback acknowledges the file:
//! processed files are deleted or moved into the `.courier` sub-folder,
//! faulted files stay in place and are picked up again by a later scan.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use courier_core::{CompletionCallback, Context, Exchange, Message, Producer, Route};
use dashmap::DashSet;
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Sub-folder that receives processed files when they are not deleted.
pub const PROCESSED_FOLDER: &str = ".courier";

/// Annotation describing the file a message was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInformation {
    pub path: PathBuf,
    pub size: u64,
    /// Base64-encoded SHA-256 of the file bytes.
    pub checksum: String,
}

impl FileInformation {
    #[must_use]
    pub fn from_bytes(path: PathBuf, bytes: &[u8]) -> Self {
        Self {
            path,
            size: bytes.len() as u64,
            checksum: checksum(bytes),
        }
    }
}

/// Base64-encoded SHA-256 digest.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    BASE64.encode(Sha256::digest(bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum FolderMonitorError {
    #[error("folder not found: '{}'", .0.display())]
    FolderNotFound(PathBuf),

    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for a [`FolderMonitor`].
///
/// No `Default` impl because the folder has no sensible default.
#[derive(Debug, Clone)]
pub struct FolderMonitorConfig {
    /// Folder to scan.
    pub folder: PathBuf,
    /// Glob matched against file names.
    pub pattern: String,
    /// Descend into sub-folders.
    pub recursive: bool,
    /// Delete processed files instead of moving them to [`PROCESSED_FOLDER`].
    pub delete_on_success: bool,
}

impl FolderMonitorConfig {
    #[must_use]
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            pattern: "*".to_string(),
            recursive: false,
            delete_on_success: false,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn with_delete_on_success(mut self, delete: bool) -> Self {
        self.delete_on_success = delete;
        self
    }

    /// Builds a monitor that dispatches every file onto `route`.
    ///
    /// The folder itself is checked on every scan, not here.
    ///
    /// # Errors
    ///
    /// Returns [`FolderMonitorError::InvalidPattern`] if the glob does not
    /// parse.
    pub fn build(
        self,
        ctx: &Context,
        route: Arc<Route<String>>,
    ) -> Result<FolderMonitor, FolderMonitorError> {
        let pattern = glob::Pattern::new(&self.pattern).map_err(|source| {
            FolderMonitorError::InvalidPattern {
                pattern: self.pattern.clone(),
                source,
            }
        })?;

        Ok(FolderMonitor {
            config: self,
            pattern,
            ctx: ctx.clone(),
            route,
            in_flight: Arc::new(DashSet::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// FolderMonitor
// ---------------------------------------------------------------------------

/// Batch producer that turns files into exchanges.
pub struct FolderMonitor {
    config: FolderMonitorConfig,
    pattern: glob::Pattern,
    ctx: Context,
    route: Arc<Route<String>>,
    in_flight: Arc<DashSet<PathBuf>>,
}

impl FolderMonitor {
    #[must_use]
    pub fn config(&self) -> &FolderMonitorConfig {
        &self.config
    }

    /// Number of files dispatched whose exchange has not settled yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Lists matching files, skipping the processed-file folder.
    ///
    /// Walks the file system on the calling thread; the producer runs it on
    /// the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`FolderMonitorError::FolderNotFound`] if the folder is
    /// missing or not a directory.
    pub fn scan(&self) -> Result<Vec<PathBuf>, FolderMonitorError> {
        scan_folder(&self.config.folder, &self.pattern, self.config.recursive)
    }

    fn acknowledgement(&self, path: PathBuf) -> CompletionCallback<String> {
        let in_flight = Arc::clone(&self.in_flight);
        let delete = self.config.delete_on_success;

        Box::new(move |exchange: &Exchange<String>| {
            let target = exchange
                .message()
                .first_metadata::<FileInformation>()
                .map_or_else(|| path.clone(), |info| info.path.clone());

            if let Some(fault) = exchange.fault() {
                warn!(path = %target.display(), fault = %fault, "failed to process file, will retry");
                in_flight.remove(&path);
                return;
            }

            let acknowledge = move || {
                if let Err(err) = settle(&target, delete) {
                    error!(path = %target.display(), error = %err, "failed to acknowledge processed file");
                }
                in_flight.remove(&path);
            };
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn_blocking(acknowledge);
                }
                Err(_) => acknowledge(),
            }
        })
    }
}

#[async_trait]
impl Producer for FolderMonitor {
    fn name(&self) -> &str {
        "folder-monitor"
    }

    async fn execute(&self) -> anyhow::Result<()> {
        info!(folder = %self.config.folder.display(), "checking folder");
        let folder = self.config.folder.clone();
        let pattern = self.pattern.clone();
        let recursive = self.config.recursive;
        let files =
            tokio::task::spawn_blocking(move || scan_folder(&folder, &pattern, recursive))
                .await??;

        let mut dispatched = 0usize;
        for path in files {
            if !self.in_flight.insert(path.clone()) {
                debug!(path = %path.display(), "file already in flight");
                continue;
            }
            match read_message(&path).await {
                Ok(message) => {
                    let callback = self.acknowledgement(path);
                    let exchange = self.ctx.create_exchange(&self.route, message, Some(callback));
                    self.ctx.start(exchange);
                    dispatched += 1;
                }
                Err(err) => {
                    self.in_flight.remove(&path);
                    warn!(path = %path.display(), error = %err, "skipping unreadable file");
                }
            }
        }

        debug!(dispatched, "folder scan complete");
        Ok(())
    }
}

fn scan_folder(
    folder: &Path,
    pattern: &glob::Pattern,
    recursive: bool,
) -> Result<Vec<PathBuf>, FolderMonitorError> {
    if !folder.is_dir() {
        return Err(FolderMonitorError::FolderNotFound(folder.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && entry.file_name() == PROCESSED_FOLDER)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry
            .file_name()
            .to_str()
            .is_some_and(|name| pattern.matches(name));
        if matched {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Reads a file into a message. Invalid UTF-8 is replaced, the checksum is
/// taken over the raw bytes.
async fn read_message(path: &Path) -> std::io::Result<Message<String>> {
    let bytes = tokio::fs::read(path).await?;
    let info = FileInformation::from_bytes(path.to_path_buf(), &bytes);
    let content = String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned());
    Ok(Message::new(content).with_metadata(info))
}

/// Deletes the file or moves it into the processed-file folder next to it.
fn settle(path: &Path, delete: bool) -> std::io::Result<()> {
    if delete {
        return std::fs::remove_file(path);
    }
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent folder",
        ));
    };
    let processed = dir.join(PROCESSED_FOLDER);
    std::fs::create_dir_all(&processed)?;
    let destination = free_destination(&processed, name);
    debug!(from = %path.display(), to = %destination.display(), "moving processed file");
    std::fs::rename(path, destination)
}

/// `<processed>/<name>`, or `<name>.1`, `<name>.2`, ... when taken, so an
/// earlier processed copy is never overwritten.
fn free_destination(processed: &Path, name: &OsStr) -> PathBuf {
    let direct = processed.join(name);
    if !direct.exists() {
        return direct;
    }
    (1u32..)
        .map(|n| {
            let mut suffixed = name.to_os_string();
            suffixed.push(format!(".{n}"));
            processed.join(suffixed)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(direct)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
