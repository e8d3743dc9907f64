//! Cancellable external process execution.

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Exit status plus stdout followed by stderr.
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub combined: String,
}

pub(crate) enum ProcessError {
    Spawn(std::io::Error),
    Cancelled,
}

/// Run `command` to completion unless `cancel` fires first, in which case the
/// child is killed.
pub(crate) async fn run_cancellable(
    mut command: Command,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(ProcessError::Spawn)?;

    // Dropping the wait future drops the child, and kill_on_drop reaps it.
    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
        output = child.wait_with_output() => output.map_err(ProcessError::Spawn)?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    Ok(ProcessOutput {
        status: output.status,
        combined: combined.trim_end().to_string(),
    })
}
