//! One end-to-end backup run: export, archive, upload, clean up.
//!
//! The [`JobRunner`] is single-flight: a [`RunGuard`] lets at most one run
//! through at a time and every other trigger returns [`RunOutcome::Skipped`]
//! immediately. A shared cancellation token is threaded through every stage,
//! including the external processes, so shutdown only waits for the current
//! stage to notice.

mod archive;
mod deps;
mod error;
mod export;
mod guard;
mod partition;
mod process;
mod runner;

pub use archive::{ARCHIVE_SUFFIX, Archiver, archive_path};
pub use deps::validate_dependencies;
pub use error::{ArchiveError, DependencyError, ExportError, RunError};
pub use export::{ExportOutput, Exporter};
pub use guard::{RunGuard, RunPermit};
pub use partition::Partition;
pub use runner::{JobConfig, JobRunner, RunOutcome, RunReport, RunStage, UploadSummary};
