//! Probe module for endpoint health checks.
//!
//! Supports HTTP, TCP, and WebSocket-handshake checks. Expected failure
//! modes (timeout, connection refused, unexpected status) are never
//! errors: they map to `down` readings, which are themselves the
//! signal. Only malformed configuration errors to the caller.

mod http;
mod tcp;
mod ws;

pub use http::*;
pub use tcp::*;
pub use ws::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::store::{Reading, ReadingState};

/// Probe error types. Only configuration problems surface as errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid endpoint spec {0:?}: {1}")]
    Config(String, String),
}

/// Kind of health check to run against an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Http,
    Tcp,
    Ws,
}

/// One monitored endpoint, as supplied by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    pub name: String,
    pub address: String,
    #[serde(default = "default_check")]
    pub check: CheckType,
    /// HTTP method; GET when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Accepted status codes. Empty means the protocol default:
    /// any 2xx/3xx for HTTP, 101 for a WebSocket upgrade.
    #[serde(default)]
    pub expected_codes: Vec<u16>,
    /// Latency above this marks the reading `degraded` instead of `up`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_time_ms: Option<u64>,
}

fn default_check() -> CheckType {
    CheckType::Http
}

fn default_timeout_ms() -> u64 {
    5000
}

impl EndpointSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Fatal-at-startup validation; a bad spec must never begin a cycle.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.name.trim().is_empty() {
            return Err(ProbeError::Config(
                self.address.clone(),
                "empty name".to_string(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(ProbeError::Config(
                self.name.clone(),
                "empty address".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ProbeError::Config(
                self.name.clone(),
                "timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn accepts(&self, code: u16) -> bool {
        if self.expected_codes.is_empty() {
            return match self.check {
                CheckType::Http => (200..400).contains(&code),
                CheckType::Ws => code == 101,
                CheckType::Tcp => true,
            };
        }
        self.expected_codes.contains(&code)
    }
}

/// What a successful network exchange looked like.
#[derive(Debug, Clone, Copy)]
pub struct CheckOutcome {
    pub code: Option<u16>,
    pub latency_ms: u64,
}

/// Run one health check and produce a reading. Never writes to storage;
/// the only side effect is the network call itself.
pub async fn probe(spec: &EndpointSpec, now: DateTime<Utc>) -> Result<Reading, ProbeError> {
    spec.validate()?;

    let result = match spec.check {
        CheckType::Http => run_http_check(spec).await,
        CheckType::Tcp => run_tcp_check(spec).await,
        CheckType::Ws => run_ws_check(spec).await,
    };

    Ok(reading_from_result(spec, now, result))
}

/// Map a check result onto the reading state machine.
fn reading_from_result(
    spec: &EndpointSpec,
    now: DateTime<Utc>,
    result: Result<CheckOutcome, String>,
) -> Reading {
    let timestamp = now.timestamp_millis();
    match result {
        Ok(outcome) => {
            if let Some(code) = outcome.code {
                if !spec.accepts(code) {
                    return Reading {
                        timestamp,
                        service: spec.name.clone(),
                        state: ReadingState::Down,
                        code: Some(code),
                        latency_ms: Some(outcome.latency_ms),
                        error: Some(format!("unexpected status {}", code)),
                    };
                }
            }
            let state = match spec.max_response_time_ms {
                Some(max) if outcome.latency_ms > max => ReadingState::Degraded,
                _ => ReadingState::Up,
            };
            Reading {
                timestamp,
                service: spec.name.clone(),
                state,
                code: outcome.code,
                latency_ms: Some(outcome.latency_ms),
                error: None,
            }
        }
        Err(err) => Reading {
            timestamp,
            service: spec.name.clone(),
            state: ReadingState::Down,
            code: None,
            latency_ms: None,
            error: Some(err),
        },
    }
}
