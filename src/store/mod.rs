//! File-backed monitoring data store.
//!
//! Day-partitioned JSON Lines archives plus two derived files: the
//! hot-window file and the rolling daily summary.

mod archive;
mod compress;
mod hot;
mod models;
mod summary;

pub use archive::*;
pub use compress::*;
pub use hot::*;
pub use models::*;
pub use summary::*;

use chrono::NaiveDate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("compressed archive {0} is empty")]
    EmptyCompressed(PathBuf),
}

/// Resolves paths within one store root directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw archive path for a UTC calendar day:
    /// `archives/{YYYY}/{MM}/history-{YYYY-MM-DD}.jsonl`.
    pub fn archive_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join("archives")
            .join(day.format("%Y").to_string())
            .join(day.format("%m").to_string())
            .join(format!("history-{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Compressed variant of [`archive_path`](Self::archive_path).
    pub fn compressed_archive_path(&self, day: NaiveDate) -> PathBuf {
        let mut p = self.archive_path(day).into_os_string();
        p.push(".gz");
        PathBuf::from(p)
    }

    pub fn hot_window_path(&self) -> PathBuf {
        self.root.join("hot-window.json")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("daily-summary.json")
    }
}

/// Replace `target` atomically: write to a sibling temp path, then rename.
///
/// Readers never observe a partially written file; on any failure the
/// previous file is left intact.
pub(crate) fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = target.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_path_layout() {
        let layout = StoreLayout::new("/data");
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            layout.archive_path(day),
            PathBuf::from("/data/archives/2025/03/history-2025-03-07.jsonl")
        );
        assert_eq!(
            layout.compressed_archive_path(day),
            PathBuf::from("/data/archives/2025/03/history-2025-03-07.jsonl.gz")
        );
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("out.json");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        // No temp file left behind
        assert!(!target.with_extension("tmp").exists());
    }
}
