//! The single-flight run pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vaultdump_store::Uploader;

use crate::{
    Archiver, DependencyError, Exporter, Partition, RunError, RunGuard, validate_dependencies,
};

/// Where a run is in its pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunStage {
    /// No run in progress.
    #[default]
    Idle,
    /// Guard acquired, partition being computed.
    Starting,
    /// External export tool running.
    Exporting,
    /// Working directory being compressed.
    Archiving,
    /// Archive being uploaded.
    Uploading,
    /// Local outputs being removed.
    Cleaning,
    /// Run finished, guard about to be released.
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Starting => "starting",
            RunStage::Exporting => "exporting",
            RunStage::Archiving => "archiving",
            RunStage::Uploading => "uploading",
            RunStage::Cleaning => "cleaning",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Settings for a [`JobRunner`].
#[derive(Clone)]
pub struct JobConfig {
    /// Root under which `<date>/<time>` working directories are created.
    pub work_root: PathBuf,
    /// Connection string handed to the export tool.
    pub source_uri: String,
    /// Export tool, resolved on `PATH`.
    pub export_tool: String,
    /// Archive tool, resolved on `PATH`.
    pub archive_tool: String,
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("work_root", &self.work_root)
            .field("source_uri", &"<redacted>")
            .field("export_tool", &self.export_tool)
            .field("archive_tool", &self.archive_tool)
            .finish()
    }
}

/// Result of the upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Destination key.
    pub key: String,
    /// Human-readable destination, e.g. `s3://bucket/key`.
    pub location: String,
    /// Attempts the upload took.
    pub attempts: u32,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// When the run acquired the guard.
    pub started_at: DateTime<Utc>,
    /// Naming keys derived from `started_at`.
    pub partition: Partition,
    /// How long the export tool ran.
    pub export_elapsed: Duration,
    /// Archive path. Removed after a successful upload; kept when uploads are
    /// disabled.
    pub archive: PathBuf,
    /// Present when an uploader is configured.
    pub upload: Option<UploadSummary>,
}

/// Non-error outcome of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run went through every stage.
    Completed(RunReport),
    /// Another run held the guard; nothing was done.
    Skipped,
}

/// Executes export → archive → upload → cleanup, one run at a time.
pub struct JobRunner {
    work_root: PathBuf,
    exporter: Exporter,
    archiver: Archiver,
    uploader: Option<Uploader>,
    guard: RunGuard,
    stage: watch::Sender<RunStage>,
}

impl JobRunner {
    /// Create a runner. Without an uploader, archives are kept under the
    /// working root instead of being shipped.
    pub fn new(config: JobConfig, uploader: Option<Uploader>) -> Self {
        let (stage, _) = watch::channel(RunStage::Idle);
        Self {
            work_root: config.work_root,
            exporter: Exporter::new(config.export_tool, config.source_uri),
            archiver: Archiver::new(config.archive_tool),
            uploader,
            guard: RunGuard::new(),
            stage,
        }
    }

    /// Root of the working directories.
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// The external tools a run needs.
    pub fn required_tools(&self) -> [&str; 2] {
        [self.exporter.program(), self.archiver.program()]
    }

    /// Check that the export and archive tools resolve on `PATH`.
    pub fn validate_dependencies(&self) -> Result<Vec<PathBuf>, DependencyError> {
        validate_dependencies(self.required_tools())
    }

    /// Whether a run currently holds the guard.
    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    /// Watch the current stage.
    pub fn subscribe_stage(&self) -> watch::Receiver<RunStage> {
        self.stage.subscribe()
    }

    /// Trigger a run now.
    ///
    /// Returns [`RunOutcome::Skipped`] without side effects when another run
    /// is active.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome, RunError> {
        self.trigger(Utc::now, cancel).await
    }

    /// Trigger a run whose partition is derived from `started_at`.
    pub async fn run_at(
        &self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.trigger(|| started_at, cancel).await
    }

    async fn trigger(
        &self,
        clock: impl FnOnce() -> DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("run already in progress, skipping trigger");
            return Ok(RunOutcome::Skipped);
        };
        // Timestamp taken under the guard so naming cannot race another run.
        self.run_guarded(clock(), cancel).await
    }

    #[tracing::instrument(
        name = "run",
        skip_all,
        fields(started_at = %started_at, partition = %Partition::from_timestamp(started_at))
    )]
    async fn run_guarded(
        &self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.set_stage(RunStage::Starting);
        let result = self.execute(started_at, cancel).await;
        self.set_stage(RunStage::Done);

        match &result {
            Ok(report) => match &report.upload {
                Some(upload) => info!(
                    partition = %report.partition,
                    export_ms = report.export_elapsed.as_millis() as u64,
                    location = %upload.location,
                    attempts = upload.attempts,
                    "run completed"
                ),
                None => info!(
                    partition = %report.partition,
                    export_ms = report.export_elapsed.as_millis() as u64,
                    archive = %report.archive.display(),
                    "run completed, archive kept locally"
                ),
            },
            Err(e) if e.is_cancelled() => warn!(stage = %e.stage(), error = %e, "run cancelled"),
            Err(e) => error!(stage = %e.stage(), error = %e, "run failed"),
        }

        self.set_stage(RunStage::Idle);
        result.map(RunOutcome::Completed)
    }

    async fn execute(
        &self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let partition = Partition::from_timestamp(started_at);
        let work_dir = partition.working_dir(&self.work_root);

        self.enter(RunStage::Exporting, cancel)?;
        let export = match self.exporter.export(&work_dir, cancel).await {
            Ok(export) => export,
            Err(e) => {
                remove_dir(&work_dir).await;
                return Err(e.into());
            }
        };
        let export_elapsed = export.elapsed;

        let archive = self.archive_export(&work_dir, cancel).await?;

        let Some(uploader) = &self.uploader else {
            return Ok(RunReport {
                started_at,
                partition,
                export_elapsed,
                archive,
                upload: None,
            });
        };

        // A failed upload keeps the archive for manual recovery.
        self.enter(RunStage::Uploading, cancel)?;
        let key = partition.object_key();
        let report = uploader.store(&archive, &key, cancel).await?;

        self.set_stage(RunStage::Cleaning);
        remove_file(&archive).await;

        Ok(RunReport {
            started_at,
            partition,
            export_elapsed,
            archive,
            upload: Some(UploadSummary {
                location: uploader.location(&key),
                key,
                attempts: report.attempts,
            }),
        })
    }

    /// Archive a finished export and remove it.
    ///
    /// Cancellation before the archive tool starts discards the export. A
    /// failed archive leaves it in place for inspection.
    async fn archive_export(
        &self,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, RunError> {
        if let Err(e) = self.enter(RunStage::Archiving, cancel) {
            remove_dir(work_dir).await;
            return Err(e);
        }
        let archive = self.archiver.archive(work_dir, cancel).await?;
        remove_dir(work_dir).await;
        Ok(archive)
    }

    /// Check cancellation at a stage boundary, then publish the stage.
    fn enter(&self, stage: RunStage, cancel: &CancellationToken) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { stage });
        }
        self.set_stage(stage);
        Ok(())
    }

    fn set_stage(&self, stage: RunStage) {
        debug!(stage = %stage, "stage");
        self.stage.send_replace(stage);
    }
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "removed working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove working directory"),
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed local archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove local archive"),
    }
}
