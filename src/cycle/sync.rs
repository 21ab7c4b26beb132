//! Commit boundary to the shared, version-controlled store.
//!
//! The file tree this crate writes into may be concurrently mutated by
//! other actors (an overlapping run, a human edit). Nothing in-process
//! needs locking; the only hazard is at the commit boundary, modeled by
//! this trait. Conflicts are retryable events, not exceptions.

use rand::Rng;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another actor changed the same paths; refresh and retry.
    #[error("commit conflict: {0}")]
    Conflict(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Commit protocol against the versioned store backing the data tree.
pub trait StoreSync: Send + Sync {
    /// Reset the working tree to the latest upstream state, discarding
    /// uncommitted local changes. Called before a commit retry so the
    /// cycle's readings are re-applied onto the new base (a rebase, not
    /// a blind overwrite).
    fn refresh(&self) -> Result<(), SyncError>;

    /// Publish the working tree as one atomic unit of work.
    fn commit(&self, message: &str) -> Result<(), SyncError>;
}

/// A plain directory with no external versioning: refresh is a no-op
/// and commits always succeed, since the filesystem writes themselves
/// are the publication.
pub struct LocalSync;

impl StoreSync for LocalSync {
    fn refresh(&self) -> Result<(), SyncError> {
        Ok(())
    }

    fn commit(&self, _message: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Exponential backoff for commit retries: 1s base doubling to a 5s
/// cap, plus jitter so overlapping actors do not retry in lockstep.
pub fn backoff_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 1000;
    const CAP_MS: u64 = 5000;

    let exp = BASE_MS.saturating_mul(1u64 << attempt.min(3)).min(CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(exp + jitter)
}
