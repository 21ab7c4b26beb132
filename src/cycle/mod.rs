//! Monitoring cycle orchestration.
//!
//! One cycle is one sequential pass over every configured service,
//! committed to the shared store as a single unit of work. Probes are
//! deliberately not parallel: one cycle equals one writer, which
//! eliminates the lost-update conflict class on the shared store at the
//! cost of cycle latency scaling with the service count.

mod sync;

pub use sync::*;

use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::maintenance::{should_skip, MaintenanceWindow};
use crate::probe::{probe, EndpointSpec, ProbeError};
use crate::store::{
    ArchiveWriter, Reading, ReadingState, StoreError, StoreLayout, SummaryAggregator,
    WindowCompactor,
};

/// Cycle error types.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ProbeError),
    #[error("commit conflict persisted after {0} attempts; cycle readings dropped")]
    RetriesExhausted(u32),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Per-service outcome of one cycle, for the scheduling/CLI layer and
/// the incident-lifecycle collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Under an in-progress maintenance window; no probe ran, nothing
    /// was appended.
    Skipped,
    Probed {
        state: ReadingState,
        /// True when the service was passing last cycle and is down now.
        transitioned_down: bool,
    },
}

/// Result of one completed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub outcomes: BTreeMap<String, ServiceOutcome>,
    pub commit_attempts: u32,
}

impl CycleReport {
    /// Services that newly went down this cycle.
    pub fn down_transitions(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| match o {
                ServiceOutcome::Probed {
                    transitioned_down: true,
                    ..
                } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Serializes one monitoring cycle into one conflict-safe store commit.
pub struct WriteCoordinator<S: StoreSync> {
    layout: StoreLayout,
    sync: S,
    hot_window_days: u32,
    summary_window_days: u32,
    max_commit_attempts: u32,
    last_states: BTreeMap<String, ReadingState>,
}

impl<S: StoreSync> WriteCoordinator<S> {
    pub fn new(
        layout: StoreLayout,
        sync: S,
        hot_window_days: u32,
        summary_window_days: u32,
    ) -> Self {
        Self {
            layout,
            sync,
            hot_window_days,
            summary_window_days,
            max_commit_attempts: 4,
            last_states: BTreeMap::new(),
        }
    }

    /// Run one full cycle: probe every service sequentially, then apply
    /// and commit all file mutations as a single unit.
    ///
    /// Nothing touches the shared store until the probe phase is fully
    /// done, so cancellation before the commit phase carries no
    /// corruption risk.
    pub async fn run_cycle(
        &mut self,
        specs: &[EndpointSpec],
        windows: &[MaintenanceWindow],
    ) -> Result<CycleReport, CycleError> {
        for spec in specs {
            spec.validate()?;
        }

        let mut outcomes = BTreeMap::new();
        let mut readings = Vec::with_capacity(specs.len());

        for spec in specs {
            let now = Utc::now();
            if should_skip(&spec.name, now, windows) {
                tracing::info!("Skipping {} (maintenance in progress)", spec.name);
                outcomes.insert(spec.name.clone(), ServiceOutcome::Skipped);
                continue;
            }

            // Waits out each probe to completion; no overlap within a cycle.
            let reading = probe(spec, now).await?;
            let was_passing = self
                .last_states
                .get(&spec.name)
                .map(|s| s.is_passing())
                .unwrap_or(true);
            let transitioned_down = was_passing && reading.state == ReadingState::Down;
            if transitioned_down {
                tracing::warn!("{} transitioned to down: {:?}", spec.name, reading.error);
            }

            self.last_states.insert(spec.name.clone(), reading.state);
            outcomes.insert(
                spec.name.clone(),
                ServiceOutcome::Probed {
                    state: reading.state,
                    transitioned_down,
                },
            );
            readings.push(reading);
        }

        let commit_attempts = self.commit_readings(&readings).await?;

        Ok(CycleReport {
            outcomes,
            commit_attempts,
        })
    }

    /// Apply the cycle's buffered readings and derived files, then
    /// commit, retrying with backoff on write conflicts. Each retry
    /// first refreshes the working tree so the same readings are
    /// re-applied onto the new base.
    pub async fn commit_readings(&self, readings: &[Reading]) -> Result<u32, CycleError> {
        let writer = ArchiveWriter::new(self.layout.clone());
        let hot_compactor = WindowCompactor::new(self.layout.clone());
        let aggregator = SummaryAggregator::new(self.layout.clone());

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                self.sync.refresh()?;
            }

            for reading in readings {
                writer.append(reading)?;
            }
            let now = Utc::now();
            let hot = hot_compactor.rebuild(self.hot_window_days, now)?;
            aggregator.regenerate(self.summary_window_days, now, &hot)?;

            let message = format!("monitor: {} readings at {}", readings.len(), now.to_rfc3339());
            match self.sync.commit(&message) {
                Ok(()) => return Ok(attempt + 1),
                Err(SyncError::Conflict(reason)) => {
                    attempt += 1;
                    if attempt >= self.max_commit_attempts {
                        tracing::error!("Giving up after {} commit attempts: {}", attempt, reason);
                        return Err(CycleError::RetriesExhausted(attempt));
                    }
                    let delay = backoff_delay(attempt - 1);
                    tracing::warn!(
                        "Commit conflict ({}), retrying in {:?} (attempt {})",
                        reason,
                        delay,
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CheckType;
    use crate::store::ArchiveReader;
    use chrono::TimeZone;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn reading(ts: i64, svc: &str, state: ReadingState) -> Reading {
        Reading {
            timestamp: ts,
            service: svc.to_string(),
            state,
            code: None,
            latency_ms: Some(5),
            error: None,
        }
    }

    /// Conflicts a fixed number of times, restoring the tree to the
    /// snapshot taken at construction on each refresh (as a real
    /// versioned store would reset to the upstream base).
    struct FlakySync {
        root: PathBuf,
        snapshot: Mutex<Vec<(PathBuf, Vec<u8>)>>,
        conflicts_left: AtomicU32,
    }

    impl FlakySync {
        fn new(root: PathBuf, conflicts: u32) -> Self {
            let snapshot = snapshot_tree(&root);
            Self {
                root,
                snapshot: Mutex::new(snapshot),
                conflicts_left: AtomicU32::new(conflicts),
            }
        }
    }

    fn snapshot_tree(root: &PathBuf) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let bytes = fs::read(&path).unwrap();
                    files.push((path, bytes));
                }
            }
        }
        files
    }

    impl StoreSync for FlakySync {
        fn refresh(&self) -> Result<(), SyncError> {
            // Reset to upstream base: wipe and restore the snapshot
            fs::remove_dir_all(&self.root).ok();
            fs::create_dir_all(&self.root)?;
            for (path, bytes) in self.snapshot.lock().unwrap().iter() {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, bytes)?;
            }
            Ok(())
        }

        fn commit(&self, _message: &str) -> Result<(), SyncError> {
            let left = self.conflicts_left.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts_left.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::Conflict("remote moved".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cycle_appends_and_builds_derived_files() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let specs = vec![EndpointSpec {
            name: "api".to_string(),
            address: addr.to_string(),
            check: CheckType::Tcp,
            method: None,
            timeout_ms: 1000,
            expected_codes: Vec::new(),
            max_response_time_ms: None,
        }];

        let mut coordinator = WriteCoordinator::new(layout.clone(), LocalSync, 14, 90);
        let report = coordinator.run_cycle(&specs, &[]).await.unwrap();

        assert_eq!(report.commit_attempts, 1);
        assert_eq!(
            report.outcomes["api"],
            ServiceOutcome::Probed {
                state: ReadingState::Up,
                transitioned_down: false
            }
        );
        let reader = ArchiveReader::new(layout.clone());
        let today = Utc::now().date_naive();
        assert_eq!(reader.read_day(today).unwrap().len(), 1);
        assert!(layout.hot_window_path().exists());
        assert!(layout.summary_path().exists());
    }

    #[tokio::test]
    async fn test_maintenance_skip_appends_nothing() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path());

        let specs = vec![EndpointSpec {
            name: "api".to_string(),
            address: "127.0.0.1:1".to_string(),
            check: CheckType::Tcp,
            method: None,
            timeout_ms: 200,
            expected_codes: Vec::new(),
            max_response_time_ms: None,
        }];
        let now_ms = Utc::now().timestamp_millis();
        let windows = vec![MaintenanceWindow {
            affected_services: ["api".to_string()].into_iter().collect(),
            start: now_ms - 60_000,
            end: now_ms + 60_000,
        }];

        let mut coordinator = WriteCoordinator::new(layout.clone(), LocalSync, 14, 90);
        let report = coordinator.run_cycle(&specs, &windows).await.unwrap();

        assert_eq!(report.outcomes["api"], ServiceOutcome::Skipped);
        let reader = ArchiveReader::new(layout);
        let today = Utc::now().date_naive();
        assert!(reader.read_day(today).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_commit_retries_and_loses_nothing() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path());

        // First cycle commits cleanly
        let first = reading(
            Utc.with_ymd_and_hms(2025, 1, 5, 9, 0, 0)
                .unwrap()
                .timestamp_millis(),
            "api",
            ReadingState::Up,
        );
        let coordinator = WriteCoordinator::new(layout.clone(), LocalSync, 14, 90);
        coordinator.commit_readings(&[first.clone()]).await.unwrap();

        // Second cycle hits one conflict, refreshes, retries, succeeds
        let sync = FlakySync::new(layout.root().to_path_buf(), 1);
        let coordinator = WriteCoordinator::new(layout.clone(), sync, 14, 90);
        let second = reading(
            Utc.with_ymd_and_hms(2025, 1, 5, 9, 5, 0)
                .unwrap()
                .timestamp_millis(),
            "api",
            ReadingState::Up,
        );
        let attempts = coordinator.commit_readings(&[second.clone()]).await.unwrap();
        assert_eq!(attempts, 2);

        // Both cycles' readings survive, none duplicated
        let reader = ArchiveReader::new(layout);
        let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(reader.read_day(day).unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path());

        let sync = FlakySync::new(layout.root().to_path_buf(), 10);
        let coordinator = WriteCoordinator::new(layout, sync, 14, 90);
        let r = reading(Utc::now().timestamp_millis(), "api", ReadingState::Up);

        let err = coordinator.commit_readings(&[r]).await.unwrap_err();
        assert!(matches!(err, CycleError::RetriesExhausted(4)));
    }

    #[tokio::test]
    async fn test_down_transition_reported_once() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path());

        // Port 1 on localhost is essentially always closed
        let specs = vec![EndpointSpec {
            name: "api".to_string(),
            address: "127.0.0.1:1".to_string(),
            check: CheckType::Tcp,
            method: None,
            timeout_ms: 300,
            expected_codes: Vec::new(),
            max_response_time_ms: None,
        }];

        let mut coordinator = WriteCoordinator::new(layout, LocalSync, 14, 90);
        let first = coordinator.run_cycle(&specs, &[]).await.unwrap();
        assert_eq!(first.down_transitions(), vec!["api"]);

        // Still down next cycle, but no new transition
        let second = coordinator.run_cycle(&specs, &[]).await.unwrap();
        assert!(second.down_transitions().is_empty());
    }
}
