//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression {expression:?}: {reason}")]
    ScheduleParse { expression: String, reason: String },

    /// `start` was called on a scheduler that is already dispatching.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// `start` was called after `stop`.
    #[error("scheduler has been stopped and cannot be restarted")]
    Stopped,
}
