//! Append-only day-partitioned archive of readings.

use chrono::{DateTime, NaiveDate};
use flate2::read::GzDecoder;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use super::{Reading, StoreError, StoreLayout};

/// Sole owner of archive mutation. Appends one line per reading to the
/// day file resolved from the reading's timestamp; never rewrites
/// existing lines.
pub struct ArchiveWriter {
    layout: StoreLayout,
}

impl ArchiveWriter {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Append a reading to its day archive, creating parents on first
    /// write of the day. Fails only on underlying I/O error, which is
    /// fatal for the cycle.
    pub fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        let day = DateTime::from_timestamp_millis(reading.timestamp)
            .map(|dt| dt.date_naive())
            .unwrap_or_default();
        let path = self.layout.archive_path(day);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(reading)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// Read-only access to day archives, transparently handling both the
/// raw and the compressed form.
pub struct ArchiveReader {
    layout: StoreLayout,
}

impl ArchiveReader {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Parse every reading in one day's archive, in append order.
    ///
    /// Returns an empty vec for a day with no archive (gaps are not
    /// backfilled). A corrupt line is skipped and logged, not fatal:
    /// this is diagnostic data, forward progress wins.
    pub fn read_day(&self, day: NaiveDate) -> Result<Vec<Reading>, StoreError> {
        let raw = self.layout.archive_path(day);
        if raw.exists() {
            let file = fs::File::open(&raw)?;
            return parse_lines(BufReader::new(file), day);
        }

        let gz = self.layout.compressed_archive_path(day);
        if gz.exists() {
            let file = fs::File::open(&gz)?;
            return parse_lines(BufReader::new(GzDecoder::new(file)), day);
        }

        Ok(Vec::new())
    }

    /// Whether any archive (raw or compressed) exists for the day.
    pub fn day_exists(&self, day: NaiveDate) -> bool {
        self.layout.archive_path(day).exists()
            || self.layout.compressed_archive_path(day).exists()
    }
}

fn parse_lines<R: BufRead>(reader: R, day: NaiveDate) -> Result<Vec<Reading>, StoreError> {
    let mut readings = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Reading>(&line) {
            Ok(r) => readings.push(r),
            Err(e) => {
                tracing::warn!("Skipping corrupt archive line {}:{}: {}", day, idx + 1, e);
            }
        }
    }
    Ok(readings)
}
