//! Configuration module for uptrack.
//!
//! Loads runtime settings from environment variables with sensible
//! defaults, and the consumed collaborator inputs (endpoint specs,
//! maintenance windows) from JSON files.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::maintenance::MaintenanceWindow;
use crate::probe::{EndpointSpec, ProbeError};

/// Configuration error types. All of these are fatal at startup; a
/// cycle never begins with a bad configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("cannot parse {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("bad value for {0}: {1:?} (expected a positive integer)")]
    BadValue(&'static str, String),
    #[error(transparent)]
    Endpoint(#[from] ProbeError),
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Root of the shared data tree (default: "data")
    pub data_dir: PathBuf,
    /// Endpoint spec list, JSON (default: "endpoints.json")
    pub endpoints_path: PathBuf,
    /// Maintenance window list, JSON; may be absent (default: "maintenance.json")
    pub maintenance_path: PathBuf,
    /// Rolling hot-window size in days (default: 14)
    pub hot_window_days: u32,
    /// Rolling summary window in days (default: 90)
    pub summary_window_days: u32,
    /// Seconds between monitoring cycles (default: 300)
    pub cycle_interval_secs: u64,
    /// Seconds between archive compression passes (default: 3600)
    pub compress_interval_secs: u64,
    /// Run a single cycle and exit instead of looping (default: false)
    pub run_once: bool,
    /// Verbose logging (default: false)
    pub verbose: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            endpoints_path: PathBuf::from("endpoints.json"),
            maintenance_path: PathBuf::from("maintenance.json"),
            hot_window_days: 14,
            summary_window_days: 90,
            cycle_interval_secs: 300,
            compress_interval_secs: 3600,
            run_once: false,
            verbose: false,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTRACK_DATA_DIR`: data tree root (default: "data")
    /// - `UPTRACK_ENDPOINTS`: endpoint spec file (default: "endpoints.json")
    /// - `UPTRACK_MAINTENANCE`: maintenance window file (default: "maintenance.json")
    /// - `UPTRACK_HOT_WINDOW_DAYS`: hot-window size (default: 14)
    /// - `UPTRACK_SUMMARY_WINDOW_DAYS`: summary window (default: 90)
    /// - `UPTRACK_CYCLE_INTERVAL_SECS`: cycle cadence (default: 300)
    /// - `UPTRACK_COMPRESS_INTERVAL_SECS`: compression cadence (default: 3600)
    /// - `UPTRACK_ONCE`: run one cycle and exit (default: false)
    /// - `UPTRACK_VERBOSE`: debug logging (default: false)
    ///
    /// A window size or interval that does not parse, or is zero, is a
    /// fatal configuration error; no cycle begins with it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(dir) = env::var("UPTRACK_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("UPTRACK_ENDPOINTS") {
            cfg.endpoints_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("UPTRACK_MAINTENANCE") {
            cfg.maintenance_path = PathBuf::from(path);
        }
        if let Ok(days) = env::var("UPTRACK_HOT_WINDOW_DAYS") {
            cfg.hot_window_days = parse_positive("UPTRACK_HOT_WINDOW_DAYS", &days)? as u32;
        }
        if let Ok(days) = env::var("UPTRACK_SUMMARY_WINDOW_DAYS") {
            cfg.summary_window_days = parse_positive("UPTRACK_SUMMARY_WINDOW_DAYS", &days)? as u32;
        }
        if let Ok(secs) = env::var("UPTRACK_CYCLE_INTERVAL_SECS") {
            cfg.cycle_interval_secs = parse_positive("UPTRACK_CYCLE_INTERVAL_SECS", &secs)?;
        }
        if let Ok(secs) = env::var("UPTRACK_COMPRESS_INTERVAL_SECS") {
            cfg.compress_interval_secs = parse_positive("UPTRACK_COMPRESS_INTERVAL_SECS", &secs)?;
        }
        cfg.run_once = env_flag("UPTRACK_ONCE");
        cfg.verbose = env_flag("UPTRACK_VERBOSE");

        Ok(cfg)
    }
}

/// Window sizes and cadences must be positive integers; a typo must not
/// silently run the monitor with an unintended default.
fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::BadValue(name, value.to_string())),
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Load and validate the endpoint spec list. Any invalid spec is fatal.
pub fn load_endpoints(path: &Path) -> Result<Vec<EndpointSpec>, ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let specs: Vec<EndpointSpec> =
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    for spec in &specs {
        spec.validate()?;
    }
    Ok(specs)
}

/// Load the maintenance window list. A missing file just means no
/// planned maintenance; a malformed one is fatal.
pub fn load_maintenance(path: &Path) -> Result<Vec<MaintenanceWindow>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Io(path.to_path_buf(), e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Re-read the maintenance window list between cycles, so windows
/// declared by the incident collaborator after startup take effect
/// without a restart. A transiently unreadable file keeps the
/// last-known-good list, logged; only the startup load is fatal.
pub fn refresh_maintenance(
    path: &Path,
    last_known: Vec<MaintenanceWindow>,
) -> Vec<MaintenanceWindow> {
    match load_maintenance(path) {
        Ok(windows) => windows,
        Err(e) => {
            tracing::warn!("Keeping previous maintenance windows: {}", e);
            last_known
        }
    }
}
