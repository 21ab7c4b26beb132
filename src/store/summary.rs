//! Rolling daily summary: per-day, per-service rollups over a long window.
//!
//! The summary is two disjoint computations: an immutable past (closed
//! days, computed once from archives and thereafter reused from the
//! previous summary file) and a recomputed present (today, rebuilt from
//! the hot window every cycle). Only the current day is ever recomputed
//! from scratch, which is what makes a 90-day view affordable without
//! re-reading 90 days of raw archive per cycle.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fs;

use super::{
    write_atomic, ArchiveReader, DailySummaryEntry, DailySummaryFile, HotWindowFile, Reading,
    ReadingState, StoreError, StoreLayout, FORMAT_VERSION,
};

pub struct SummaryAggregator {
    layout: StoreLayout,
    reader: ArchiveReader,
}

impl SummaryAggregator {
    pub fn new(layout: StoreLayout) -> Self {
        let reader = ArchiveReader::new(layout.clone());
        Self { layout, reader }
    }

    /// Recompute the summary file for the rolling window ending at `now`
    /// and atomically replace it on disk.
    ///
    /// Today's entries come from the hot window (partial-day data, they
    /// change throughout the day). Entries for closed days are reused
    /// from the previous summary when present, otherwise computed from
    /// the day's archive.
    pub fn regenerate(
        &self,
        window_days: u32,
        now: DateTime<Utc>,
        hot: &HotWindowFile,
    ) -> Result<DailySummaryFile, StoreError> {
        let today = now.date_naive();
        let previous = self.load_previous();

        let mut services: BTreeMap<String, Vec<DailySummaryEntry>> = BTreeMap::new();
        let mut day = today - ChronoDuration::days(window_days as i64 - 1);
        while day <= today {
            if day == today {
                for (service, entry) in self.compute_today(today, hot) {
                    services.entry(service).or_default().push(entry);
                }
            } else {
                for (service, entry) in self.closed_day_entries(day, previous.as_ref())? {
                    services.entry(service).or_default().push(entry);
                }
            }
            day = match day.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }

        // Entries were pushed oldest to newest; trim each service to the
        // most recent window_days rows.
        for rows in services.values_mut() {
            if rows.len() > window_days as usize {
                let excess = rows.len() - window_days as usize;
                rows.drain(..excess);
            }
        }

        let file = DailySummaryFile {
            version: FORMAT_VERSION,
            last_updated: now.timestamp_millis(),
            window_days,
            services,
        };

        let json = serde_json::to_vec(&file)?;
        write_atomic(&self.layout.summary_path(), &json)?;
        Ok(file)
    }

    /// Entries for a closed day: reuse the previous summary's rows for
    /// that date if any exist (closed archives never change, so their
    /// rows are stable), otherwise compute from the day's archive.
    fn closed_day_entries(
        &self,
        day: NaiveDate,
        previous: Option<&DailySummaryFile>,
    ) -> Result<Vec<(String, DailySummaryEntry)>, StoreError> {
        if let Some(prev) = previous {
            let cached: Vec<(String, DailySummaryEntry)> = prev
                .services
                .iter()
                .filter_map(|(service, rows)| {
                    rows.iter()
                        .find(|e| e.date == day)
                        .map(|e| (service.clone(), e.clone()))
                })
                .collect();
            if !cached.is_empty() {
                return Ok(cached);
            }
        }

        if !self.reader.day_exists(day) {
            return Ok(Vec::new());
        }
        let readings = self.reader.read_day(day)?;
        Ok(compute_day(day, &readings))
    }

    fn compute_today(
        &self,
        today: NaiveDate,
        hot: &HotWindowFile,
    ) -> Vec<(String, DailySummaryEntry)> {
        let todays: Vec<Reading> = hot
            .readings
            .iter()
            .filter(|r| r.day() == Some(today))
            .cloned()
            .collect();
        compute_day(today, &todays)
    }

    /// The previous summary file, if one exists and parses. A corrupt
    /// or missing file just means every closed day gets recomputed.
    fn load_previous(&self) -> Option<DailySummaryFile> {
        let path = self.layout.summary_path();
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("Ignoring unreadable summary file {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Roll up one day's readings into per-service entries.
///
/// Maintenance readings count as "no data": excluded from both the
/// numerator and the denominator of the uptime math. A service whose
/// only readings that day are maintenance gets no entry at all.
fn compute_day(day: NaiveDate, readings: &[Reading]) -> Vec<(String, DailySummaryEntry)> {
    let mut by_service: BTreeMap<&str, Vec<&Reading>> = BTreeMap::new();
    for r in readings {
        if r.state == ReadingState::Maintenance {
            continue;
        }
        by_service.entry(r.service.as_str()).or_default().push(r);
    }

    by_service
        .into_iter()
        .map(|(service, rows)| (service.to_string(), summarize(day, &rows)))
        .collect()
}

fn summarize(day: NaiveDate, rows: &[&Reading]) -> DailySummaryEntry {
    let checks_total = rows.len() as u64;
    let checks_passed = rows.iter().filter(|r| r.state.is_passing()).count() as u64;
    let uptime_pct = round3(checks_passed as f64 / checks_total as f64);

    let mut latencies: Vec<u64> = rows.iter().filter_map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        let sum: u64 = latencies.iter().sum();
        Some(round2(sum as f64 / latencies.len() as f64))
    };
    let p95_latency_ms = percentile_nearest_rank(&latencies, 0.95);

    DailySummaryEntry {
        date: day,
        uptime_pct,
        avg_latency_ms,
        p95_latency_ms,
        checks_total,
        checks_passed,
        incident_count: count_incidents(rows),
    }
}

/// Number of transitions into a down run: a contiguous streak of down
/// readings counts as one incident.
fn count_incidents(rows: &[&Reading]) -> u64 {
    let mut incidents = 0;
    let mut in_down_run = false;
    for r in rows {
        let down = r.state == ReadingState::Down;
        if down && !in_down_run {
            incidents += 1;
        }
        in_down_run = down;
    }
    incidents
}

/// Nearest-rank percentile over a sorted slice. Chosen over
/// interpolation for simplicity; adequate for read-only analytics.
fn percentile_nearest_rank(sorted: &[u64], pct: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
