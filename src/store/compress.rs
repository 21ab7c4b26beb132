//! Compaction of closed archive days into gzip form.

use chrono::{DateTime, NaiveDate, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::{StoreError, StoreLayout};

/// Losslessly compresses closed (non-current-day) raw archives.
///
/// Idempotent: already-compressed days are skipped, and a second run
/// right after a first is a no-op.
pub struct ArchiveCompactor {
    layout: StoreLayout,
}

impl ArchiveCompactor {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Compress every raw archive strictly older than the current UTC
    /// day and return the compressed paths. Today's file is never
    /// touched while it is still open for appends.
    pub fn compress_closed_archives(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let today = now.date_naive();
        let mut compressed = Vec::new();

        for day in self.raw_archive_days()? {
            if day >= today {
                continue;
            }
            let gz_path = self.compress_day(day)?;
            tracing::info!("Compressed archive for {}", day);
            compressed.push(gz_path);
        }

        Ok(compressed)
    }

    /// Gzip one day's raw archive. The raw file is removed only after
    /// the compressed file is confirmed written and non-empty, so a
    /// crash mid-compression never loses readings.
    fn compress_day(&self, day: NaiveDate) -> Result<PathBuf, StoreError> {
        let raw_path = self.layout.archive_path(day);
        let gz_path = self.layout.compressed_archive_path(day);

        let raw = fs::read(&raw_path)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let encoded = encoder.finish()?;

        let tmp = gz_path.with_extension("gz.tmp");
        fs::write(&tmp, &encoded)?;
        fs::rename(&tmp, &gz_path)?;

        if fs::metadata(&gz_path)?.len() == 0 {
            return Err(StoreError::EmptyCompressed(gz_path));
        }
        fs::remove_file(&raw_path)?;
        Ok(gz_path)
    }

    /// Enumerate days that still have a raw `.jsonl` archive on disk.
    fn raw_archive_days(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let archives = self.layout.root().join("archives");
        let mut days = Vec::new();
        if !archives.exists() {
            return Ok(days);
        }

        for year in fs::read_dir(&archives)? {
            let year = year?.path();
            if !year.is_dir() {
                continue;
            }
            for month in fs::read_dir(&year)? {
                let month = month?.path();
                if !month.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&month)? {
                    let path = entry?.path();
                    let name = match path.file_name().and_then(|n| n.to_str()) {
                        Some(n) => n,
                        None => continue,
                    };
                    if let Some(day) = parse_archive_day(name) {
                        days.push(day);
                    }
                }
            }
        }

        days.sort();
        Ok(days)
    }
}

/// Extract the day from a raw archive filename, `history-YYYY-MM-DD.jsonl`.
fn parse_archive_day(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix("history-")?.strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
