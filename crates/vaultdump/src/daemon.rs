//! Process lifecycle: the scheduled daemon and the one-shot commands.
//!
//! Startup order:
//! 1. Validate the export and archive tools and create the working root
//! 2. Build the uploader (unless uploads are disabled) and the job runner
//! 3. Start the scheduler and fire one run immediately on its tracker
//! 4. On SIGINT/SIGTERM cancel in-flight runs, stop the scheduler and wait
//!    for every tracked run to return

use std::sync::Arc;

use chrono::Utc;
use miette::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vaultdump_job::{JobRunner, RunError, RunOutcome, validate_dependencies};
use vaultdump_scheduler::{CronSchedule, Scheduler, Tick, TickHandler};
use vaultdump_store::{S3Store, Uploader};

use crate::config::Config;

/// How many upcoming fire times `check` prints.
const PREVIEW_COUNT: usize = 5;

/// What caused a run, for log context.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Startup,
    Tick(u64),
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Startup => f.write_str("startup"),
            Trigger::Tick(sequence) => write!(f, "tick-{sequence}"),
            Trigger::Manual => f.write_str("manual"),
        }
    }
}

/// Validate tools, prepare the working root and build the runner.
async fn build_runner(config: &Config) -> Result<JobRunner> {
    let resolved = validate_dependencies([&config.job.export_tool, &config.job.archive_tool])
        .map_err(|e| miette::miette!("{}", e))?;
    for path in &resolved {
        debug!(path = %path.display(), "dependency ok");
    }

    config
        .prepare_work_root()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let uploader = match &config.upload {
        Some(upload) => {
            let store = S3Store::connect(&upload.s3).await;
            info!(
                bucket = %upload.s3.bucket,
                region = %upload.s3.region,
                "uploads enabled"
            );
            Some(Uploader::new(Arc::new(store), upload.retry.clone()))
        }
        None => {
            info!("uploads disabled, archives are kept locally");
            None
        }
    };

    Ok(JobRunner::new(config.job.clone(), uploader))
}

/// Run once and log the result. Errors are already logged by the runner.
async fn run_logged(
    runner: &JobRunner,
    cancel: &CancellationToken,
    trigger: Trigger,
) -> Result<RunOutcome, RunError> {
    let result = runner.run(cancel).await;
    match &result {
        Ok(RunOutcome::Completed(_)) => debug!(trigger = %trigger, "run finished"),
        Ok(RunOutcome::Skipped) => {
            info!(trigger = %trigger, "previous run still in progress, skipping")
        }
        Err(e) => debug!(trigger = %trigger, stage = %e.stage(), "run did not complete"),
    }
    result
}

fn tick_handler(runner: Arc<JobRunner>, cancel: CancellationToken) -> TickHandler {
    Arc::new(move |tick: Tick| {
        let runner = Arc::clone(&runner);
        let cancel = cancel.clone();
        Box::pin(async move {
            debug!(
                sequence = tick.sequence,
                scheduled_for = %tick.scheduled_for,
                "tick"
            );
            let _ = run_logged(&runner, &cancel, Trigger::Tick(tick.sequence)).await;
        })
    })
}

/// Run the scheduled daemon until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    info!(
        work_root = %config.job.work_root.display(),
        schedule = %config.schedule,
        "starting vaultdump daemon"
    );

    let runner = Arc::new(build_runner(&config).await?);
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new();

    scheduler
        .start(
            &config.schedule,
            tick_handler(Arc::clone(&runner), cancel.clone()),
        )
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    // Immediate run shares the tracker so shutdown waits for it too.
    let tracker = scheduler.tracker();
    {
        let runner = Arc::clone(&runner);
        let cancel = cancel.clone();
        tracker.spawn(async move {
            let _ = run_logged(&runner, &cancel, Trigger::Startup).await;
        });
    }

    shutdown_signal().await;
    info!(in_progress = runner.is_running(), "shutdown requested");

    cancel.cancel();
    scheduler.stop().await;
    tracker.close();
    tracker.wait().await;

    info!("shut down");
    Ok(())
}

/// Run the job once, honoring Ctrl-C, and fail if the run fails.
pub async fn run_once(config: Config) -> Result<()> {
    let runner = build_runner(&config).await?;
    let cancel = CancellationToken::new();

    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("cancelling run");
            cancel.cancel();
        })
    };

    let result = run_logged(&runner, &cancel, Trigger::Manual).await;
    signal.abort();

    match result {
        Ok(RunOutcome::Completed(report)) => {
            match report.upload {
                Some(upload) => println!("uploaded {}", upload.location),
                None => println!("archive kept at {}", report.archive.display()),
            }
            Ok(())
        }
        Ok(RunOutcome::Skipped) => Err(miette::miette!("run skipped: another run is in progress")),
        Err(e) => Err(miette::miette!("run failed during {}: {}", e.stage(), e)),
    }
}

/// Validate configuration, tools and schedule without running anything.
pub async fn check(config: Config) -> Result<()> {
    let schedule = CronSchedule::parse(&config.schedule).map_err(|e| miette::miette!("{}", e))?;
    let runner = JobRunner::new(config.job.clone(), None);
    let resolved = runner
        .validate_dependencies()
        .map_err(|e| miette::miette!("{}", e))?;

    println!("work root:   {}", config.job.work_root.display());
    for (tool, path) in runner.required_tools().iter().zip(&resolved) {
        println!("tool:        {} -> {}", tool, path.display());
    }
    match &config.upload {
        Some(upload) => {
            println!("destination: s3://{} ({})", upload.s3.bucket, upload.s3.region);
            if let Some(endpoint) = &upload.s3.endpoint_url {
                println!("endpoint:    {endpoint}");
            }
            println!(
                "retry:       initial {:?}, budget {:?}",
                upload.retry.initial_interval, upload.retry.max_elapsed_time
            );
        }
        None => println!("destination: uploads disabled"),
    }
    println!("schedule:    {schedule}");
    for at in schedule.upcoming(Utc::now(), PREVIEW_COUNT) {
        println!("  next:      {}", at.to_rfc3339());
    }
    Ok(())
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Startup.to_string(), "startup");
        assert_eq!(Trigger::Tick(7).to_string(), "tick-7");
        assert_eq!(Trigger::Manual.to_string(), "manual");
    }
}
