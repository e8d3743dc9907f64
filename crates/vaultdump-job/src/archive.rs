//! Package a directory into a gzip-compressed tarball.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ArchiveError;
use crate::process::{ProcessError, run_cancellable};

/// Suffix appended to a directory path to name its archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// `<source_dir>.tar.gz`
pub fn archive_path(source_dir: &Path) -> PathBuf {
    let mut path: OsString = source_dir.as_os_str().to_owned();
    path.push(ARCHIVE_SUFFIX);
    PathBuf::from(path)
}

/// Compresses a directory with an external tar-compatible tool.
///
/// The archive is rooted at the directory's parent, so extracting it yields
/// `<dir-name>/...`.
#[derive(Debug, Clone)]
pub struct Archiver {
    program: String,
}

impl Archiver {
    /// Create an archiver using `program` (normally `tar`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The archive tool.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Archive `source_dir` into `<source_dir>.tar.gz` and return that path.
    ///
    /// On any failure the partial archive is removed before returning.
    pub async fn archive(
        &self,
        source_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ArchiveError> {
        let unreadable = |source: std::io::Error| ArchiveError::SourceUnreadable {
            path: source_dir.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(source_dir).await.map_err(unreadable)?;
        if !metadata.is_dir() {
            return Err(unreadable(std::io::Error::other("not a directory")));
        }
        // Opening the directory catches permission problems before the tool runs.
        tokio::fs::read_dir(source_dir).await.map_err(unreadable)?;

        let (Some(parent), Some(name)) = (source_dir.parent(), source_dir.file_name()) else {
            return Err(unreadable(std::io::Error::other(
                "path has no parent directory or final component",
            )));
        };

        let target = archive_path(source_dir);
        let mut command = Command::new(&self.program);
        command
            .arg("-czf")
            .arg(&target)
            .arg("-C")
            .arg(parent)
            .arg(name);

        debug!(
            program = %self.program,
            source = %source_dir.display(),
            target = %target.display(),
            "creating archive"
        );

        let result = match run_cancellable(command, cancel).await {
            Ok(result) => result,
            Err(e) => {
                remove_partial(&target).await;
                return Err(match e {
                    ProcessError::Spawn(source) => ArchiveError::Spawn {
                        program: self.program.clone(),
                        source,
                    },
                    ProcessError::Cancelled => ArchiveError::Cancelled,
                });
            }
        };

        if !result.status.success() {
            remove_partial(&target).await;
            return Err(ArchiveError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                output: result.combined,
            });
        }

        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => {
                debug!(target = %target.display(), bytes = meta.len(), "archive created");
                Ok(target)
            }
            _ => Err(ArchiveError::Missing { path: target }),
        }
    }
}

async fn remove_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => debug!(target = %target.display(), "removed partial archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            target = %target.display(),
            error = %e,
            "failed to remove partial archive"
        ),
    }
}
