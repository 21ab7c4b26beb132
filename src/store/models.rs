//! Storage model types and on-disk formats.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format version stamped into the hot-window and summary files.
pub const FORMAT_VERSION: u32 = 1;

/// Health state recorded by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingState {
    Up,
    Down,
    Degraded,
    Maintenance,
}

impl ReadingState {
    /// Whether this reading counts as a passed check for uptime math.
    pub fn is_passing(self) -> bool {
        matches!(self, ReadingState::Up | ReadingState::Degraded)
    }
}

/// One probe outcome for one service at one instant.
///
/// Serialized as a single compact JSON Lines entry in the day archive.
/// Lines are immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Epoch milliseconds, UTC.
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "svc")]
    pub service: String,
    pub state: ReadingState,
    /// Protocol-level status code, when the probe got far enough to see one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Omitted on hard failure.
    #[serde(rename = "lat", default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(rename = "err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    /// UTC calendar day this reading belongs to.
    pub fn day(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(self.timestamp).map(|dt| dt.date_naive())
    }
}

/// Materialized rolling-window file for fast client reads.
///
/// Carries no information not present in the archives; it can be deleted
/// and rebuilt with no data loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotWindowFile {
    pub version: u32,
    /// Epoch milliseconds of the rebuild that produced this file.
    pub generated: i64,
    /// Grouped by service (sorted), archive order within a service.
    pub readings: Vec<Reading>,
}

/// One per-day, per-service rollup row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummaryEntry {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Passed / total among non-maintenance readings, 0..=1.
    pub uptime_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_latency_ms: Option<u64>,
    pub checks_total: u64,
    pub checks_passed: u64,
    pub incident_count: u64,
}

/// Versioned container for the rolling daily summary.
///
/// Entries per service are ordered oldest to newest and trimmed to the
/// configured window on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummaryFile {
    pub version: u32,
    /// Epoch milliseconds of the last regeneration.
    pub last_updated: i64,
    pub window_days: u32,
    pub services: BTreeMap<String, Vec<DailySummaryEntry>>,
}

impl DailySummaryFile {
    pub fn empty(window_days: u32, now_ms: i64) -> Self {
        Self {
            version: FORMAT_VERSION,
            last_updated: now_ms,
            window_days,
            services: BTreeMap::new(),
        }
    }

    /// Look up the stable entry for a prior day, if one was already computed.
    pub fn entry_for(&self, service: &str, date: NaiveDate) -> Option<&DailySummaryEntry> {
        self.services
            .get(service)
            .and_then(|rows| rows.iter().find(|e| e.date == date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_wire_format_compact_keys() {
        let r = Reading {
            timestamp: 1735689600000,
            service: "api".to_string(),
            state: ReadingState::Up,
            code: Some(200),
            latency_ms: Some(52),
            error: None,
        };
        let line = serde_json::to_string(&r).unwrap();
        assert!(line.contains("\"t\":1735689600000"));
        assert!(line.contains("\"svc\":\"api\""));
        assert!(line.contains("\"state\":\"up\""));
        assert!(line.contains("\"lat\":52"));
        // Nullable fields are omitted, not null
        assert!(!line.contains("err"));

        let back: Reading = serde_json::from_str(&line).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_reading_down_omits_latency() {
        let r = Reading {
            timestamp: 1735689600000,
            service: "api".to_string(),
            state: ReadingState::Down,
            code: None,
            latency_ms: None,
            error: Some("connection refused".to_string()),
        };
        let line = serde_json::to_string(&r).unwrap();
        assert!(!line.contains("lat"));
        assert!(line.contains("\"err\":\"connection refused\""));
    }

    #[test]
    fn test_reading_day() {
        let r = Reading {
            timestamp: 1735689600000, // 2025-01-01T00:00:00Z
            service: "api".to_string(),
            state: ReadingState::Up,
            code: Some(200),
            latency_ms: Some(10),
            error: None,
        };
        assert_eq!(r.day(), NaiveDate::from_ymd_opt(2025, 1, 1));
    }

    #[test]
    fn test_summary_entry_lookup() {
        let mut file = DailySummaryFile::empty(90, 0);
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        file.services.insert(
            "api".to_string(),
            vec![DailySummaryEntry {
                date,
                uptime_pct: 1.0,
                avg_latency_ms: Some(10.0),
                p95_latency_ms: Some(12),
                checks_total: 10,
                checks_passed: 10,
                incident_count: 0,
            }],
        );
        assert!(file.entry_for("api", date).is_some());
        assert!(file.entry_for("api", date.succ_opt().unwrap()).is_none());
        assert!(file.entry_for("web", date).is_none());
    }
}
