//! Run the external database export tool.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ExportError;
use crate::process::{ProcessError, run_cancellable};

/// Output of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Combined stdout and stderr of the tool.
    pub output: String,
    /// Wall-clock duration of the tool.
    pub elapsed: Duration,
}

/// Invokes `<program> --uri <source-uri> --out <directory>`.
#[derive(Clone)]
pub struct Exporter {
    program: String,
    source_uri: String,
}

impl Exporter {
    /// Create an exporter for `source_uri` using `program`.
    pub fn new(program: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            source_uri: source_uri.into(),
        }
    }

    /// The export tool.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Create `out_dir` and export into it.
    ///
    /// A partially written `out_dir` is left behind on failure; removing it is
    /// the caller's decision.
    pub async fn export(
        &self,
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExportOutput, ExportError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| ExportError::CreateDir {
                path: out_dir.to_path_buf(),
                source,
            })?;

        let mut command = Command::new(&self.program);
        command
            .arg("--uri")
            .arg(&self.source_uri)
            .arg("--out")
            .arg(out_dir);

        debug!(program = %self.program, out_dir = %out_dir.display(), "starting export");
        let started = Instant::now();

        let result = run_cancellable(command, cancel)
            .await
            .map_err(|e| match e {
                ProcessError::Spawn(source) => ExportError::Spawn {
                    program: self.program.clone(),
                    source,
                },
                ProcessError::Cancelled => ExportError::Cancelled,
            })?;

        if !result.status.success() {
            warn!(
                program = %self.program,
                status = %result.status,
                output = %result.combined,
                "export tool failed"
            );
            return Err(ExportError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                output: result.combined,
            });
        }

        let elapsed = started.elapsed();
        debug!(
            program = %self.program,
            elapsed_ms = elapsed.as_millis() as u64,
            output = %result.combined,
            "export tool finished"
        );

        Ok(ExportOutput {
            output: result.combined,
            elapsed,
        })
    }
}

// The connection string usually carries credentials.
impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("program", &self.program)
            .field("source_uri", &"<redacted>")
            .finish()
    }
}
