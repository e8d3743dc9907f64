//! Error types for runs and their stages.

use std::path::PathBuf;

use thiserror::Error;
use vaultdump_store::UploadError;

use crate::RunStage;

/// A required external tool is not on the search path.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// `which` could not resolve the tool.
    #[error("required tool {tool:?} not found in PATH: {source}")]
    Missing {
        tool: String,
        #[source]
        source: which::Error,
    },
}

/// Errors from the export stage.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The working directory could not be created.
    #[error("failed to create working directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The export tool could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The export tool exited unsuccessfully.
    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    /// The cancellation token fired while the tool was running.
    #[error("export cancelled")]
    Cancelled,
}

/// Errors from the archive stage.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source directory is missing, unreadable or not a directory.
    #[error("cannot read source directory {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive tool could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive tool exited unsuccessfully.
    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    /// The tool reported success but the archive is not on disk.
    #[error("archive {} missing after successful exit", .path.display())]
    Missing { path: PathBuf },

    /// The cancellation token fired while archiving.
    #[error("archive cancelled")]
    Cancelled,
}

/// Why a run ended without completing.
#[derive(Debug, Error)]
pub enum RunError {
    /// Export failed.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// Archiving failed.
    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),

    /// Upload failed after retries, or was cancelled.
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Cancellation was observed at a stage boundary.
    #[error("run cancelled before {stage}")]
    Cancelled { stage: RunStage },
}

impl RunError {
    /// The stage the run was in when it failed.
    pub fn stage(&self) -> RunStage {
        match self {
            RunError::Export(_) => RunStage::Exporting,
            RunError::Archive(_) => RunStage::Archiving,
            RunError::Upload(_) => RunStage::Uploading,
            RunError::Cancelled { stage } => *stage,
        }
    }

    /// Whether the run ended because of cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            RunError::Export(ExportError::Cancelled)
            | RunError::Archive(ArchiveError::Cancelled)
            | RunError::Cancelled { .. } => true,
            RunError::Upload(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
