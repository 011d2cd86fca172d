//! # File Lifecycle
//!
//! Moves receipt files out of the inbox once their fate is known.
//!
//! ```text
//!   data/to_check/receipt.json
//!        │
//!        ├── Stored / Skipped ──► data/parsed/receipt.json
//!        │
//!        └── IngestError ───────► data/rejected/receipt.json
//!
//!   Destination taken? receipt.json → receipt-1.json → receipt-2.json ...
//! ```
//!
//! Files are renamed, never copied and deleted, so the source is only gone
//! once the destination exists.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::config::FolderSettings;
use crate::error::{IngestError, IngestResult};

/// Where a processed file goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stored, or skipped as duplicate / ignored / declined.
    Processed,
    /// Parsing, validation or persistence failed.
    Rejected,
}

/// Inbox plus the two destination folders.
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    inbox: PathBuf,
    processed: PathBuf,
    rejected: PathBuf,
}

impl FileLifecycle {
    pub fn new(
        inbox: impl Into<PathBuf>,
        processed: impl Into<PathBuf>,
        rejected: impl Into<PathBuf>,
    ) -> Self {
        FileLifecycle {
            inbox: inbox.into(),
            processed: processed.into(),
            rejected: rejected.into(),
        }
    }

    pub fn from_settings(folders: &FolderSettings) -> Self {
        Self::new(&folders.inbox, &folders.processed, &folders.rejected)
    }

    /// Returns a copy that reads from a different inbox.
    pub fn with_inbox(mut self, inbox: impl Into<PathBuf>) -> Self {
        self.inbox = inbox.into();
        self
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn destination_dir(&self, disposition: Disposition) -> &Path {
        match disposition {
            Disposition::Processed => &self.processed,
            Disposition::Rejected => &self.rejected,
        }
    }

    /// Lists `*.json` files waiting in the inbox, sorted by file name.
    ///
    /// A missing inbox is created and yields an empty list.
    pub async fn pending(&self) -> IngestResult<Vec<PathBuf>> {
        fs::create_dir_all(&self.inbox).await?;

        let mut entries = fs::read_dir(&self.inbox).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!(inbox = ?self.inbox, count = files.len(), "Listed pending receipt files");
        Ok(files)
    }

    /// Moves `path` into the folder for `disposition`.
    ///
    /// ## Returns
    /// The new location. The file name is kept unless it is already taken,
    /// in which case `-1`, `-2`, ... is appended to the stem.
    ///
    /// ## Errors
    /// * `MoveFailed` - the rename itself failed; the source is untouched
    pub async fn route(&self, path: &Path, disposition: Disposition) -> IngestResult<PathBuf> {
        let dir = self.destination_dir(disposition);
        fs::create_dir_all(dir).await?;

        let file_name = path.file_name().ok_or_else(|| IngestError::MoveFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
        })?;

        let target = free_destination(dir, Path::new(file_name)).await?;
        fs::rename(path, &target)
            .await
            .map_err(|source| IngestError::MoveFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!(from = ?path, to = ?target, ?disposition, "Receipt file routed");
        Ok(target)
    }
}

/// First `dir/name`, `dir/stem-1.ext`, `dir/stem-2.ext`... that does not exist.
async fn free_destination(dir: &Path, name: &Path) -> IngestResult<PathBuf> {
    let candidate = dir.join(name);
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let file_name = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = dir.join(file_name);
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}
