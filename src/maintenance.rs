//! Maintenance windows: planned downtime that should not read as incidents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Derived lifecycle status of a maintenance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintenanceStatus {
    Upcoming,
    InProgress,
    Completed,
}

/// A planned maintenance window, supplied by the incident-tracking
/// collaborator. Read-only input to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub affected_services: BTreeSet<String>,
    /// Epoch milliseconds, UTC.
    pub start: i64,
    pub end: i64,
}

impl MaintenanceWindow {
    pub fn status(&self, now: DateTime<Utc>) -> MaintenanceStatus {
        let now_ms = now.timestamp_millis();
        if now_ms < self.start {
            MaintenanceStatus::Upcoming
        } else if now_ms <= self.end {
            MaintenanceStatus::InProgress
        } else {
            MaintenanceStatus::Completed
        }
    }
}

/// Decides whether a service's probe should be skipped this cycle.
///
/// While a window is in progress for a service, no probe runs and no
/// reading of any kind is appended: the absence of data for the window
/// is itself the signal, which keeps the uptime math correct without
/// special-casing a synthetic state in every consumer.
pub fn should_skip(service: &str, now: DateTime<Utc>, windows: &[MaintenanceWindow]) -> bool {
    windows.iter().any(|w| {
        w.status(now) == MaintenanceStatus::InProgress && w.affected_services.contains(service)
    })
}
