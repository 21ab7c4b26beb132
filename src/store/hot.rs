//! Hot-window rebuild: the small rolling-window file clients load first.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;

use super::{write_atomic, ArchiveReader, HotWindowFile, Reading, StoreError, StoreLayout, FORMAT_VERSION};

/// Rebuilds the hot-window file wholesale from the archives.
///
/// The hot file is a pure function of the archive log, so it is
/// regenerated from scratch on every cycle rather than patched in
/// place. That keeps it correct even after manual archive edits or
/// gaps, and means it can always be deleted and rebuilt.
pub struct WindowCompactor {
    layout: StoreLayout,
    reader: ArchiveReader,
}

impl WindowCompactor {
    pub fn new(layout: StoreLayout) -> Self {
        let reader = ArchiveReader::new(layout.clone());
        Self { layout, reader }
    }

    /// Replay the last `window_days` of archives (raw or compressed),
    /// group readings by service, and atomically replace the hot file.
    ///
    /// Deterministic for a fixed `now` and archive set: two runs
    /// produce byte-identical output.
    pub fn rebuild(
        &self,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<HotWindowFile, StoreError> {
        let window_start = now - ChronoDuration::days(window_days as i64);
        let start_ms = window_start.timestamp_millis();
        let end_ms = now.timestamp_millis();

        // Grouped by service, archive append order within each service.
        let mut by_service: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
        let mut day = window_start.date_naive();
        let last_day = now.date_naive();
        while day <= last_day {
            for reading in self.reader.read_day(day)? {
                // Exact window boundary, not just day granularity
                if reading.timestamp < start_ms || reading.timestamp > end_ms {
                    continue;
                }
                by_service
                    .entry(reading.service.clone())
                    .or_default()
                    .push(reading);
            }
            day = match day.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }

        let hot = HotWindowFile {
            version: FORMAT_VERSION,
            generated: end_ms,
            readings: by_service.into_values().flatten().collect(),
        };

        let json = serde_json::to_vec(&hot)?;
        write_atomic(&self.layout.hot_window_path(), &json)?;
        Ok(hot)
    }
}
