//! Error types for uploads.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single failed attempt against the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The local file could not be opened for streaming.
    #[error("failed to open {} for upload: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote side failed or rejected the request.
    #[error("remote store failed for key {key}: {message}")]
    Remote { key: String, message: String },

    /// The attempt did not finish within the remaining retry budget.
    #[error("upload of {key} timed out after {after:?}")]
    TimedOut { key: String, after: Duration },
}

/// Terminal result of a retried upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The cancellation token fired; no further attempts were made.
    #[error("upload cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The retry budget ran out. Carries the last attempt's error.
    #[error("upload gave up after {attempts} attempt(s) in {elapsed:?}: {source}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: StoreError,
    },
}

impl UploadError {
    /// Whether this error was caused by cancellation rather than the remote.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled { .. })
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            UploadError::Cancelled { attempts } | UploadError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}
