//! Tick dispatcher implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{CronSchedule, SchedulerError, Tick};

/// Type alias for the tick handler.
///
/// The handler owns everything it needs; the scheduler never inspects what it
/// did, so any error reporting happens inside the returned future.
pub type TickHandler =
    Arc<dyn Fn(Tick) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

enum State {
    Idle,
    Running {
        schedule: CronSchedule,
        dispatch: JoinHandle<()>,
    },
    Stopped,
}

/// Fires a handler on every tick of a cron schedule.
///
/// Handlers are spawned onto a [`TaskTracker`] and never awaited by the
/// dispatch loop, so a slow handler does not delay the next tick. Overlap
/// between handlers is the handler's concern.
pub struct Scheduler {
    state: Mutex<State>,
    stop: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Parse `expression` and begin dispatching `handler` on every tick.
    pub async fn start(
        &self,
        expression: &str,
        handler: TickHandler,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().await;
        match *state {
            State::Idle => {}
            State::Running { .. } => return Err(SchedulerError::AlreadyStarted),
            State::Stopped => return Err(SchedulerError::Stopped),
        }

        let schedule = CronSchedule::parse(expression)?;
        let dispatch = tokio::spawn(dispatch_loop(
            schedule.clone(),
            handler,
            self.stop.clone(),
            self.tracker.clone(),
        ));

        info!(schedule = %schedule, "scheduler started");
        *state = State::Running { schedule, dispatch };
        Ok(())
    }

    /// Halt future ticks and wait for the dispatch loop to exit.
    ///
    /// Handlers already spawned keep running; wait on [`Scheduler::tracker`]
    /// for them.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, State::Stopped)
        };

        self.stop.cancel();
        self.tracker.close();

        if let State::Running { schedule, dispatch } = previous {
            if let Err(e) = dispatch.await {
                warn!(schedule = %schedule, error = %e, "dispatch loop ended abnormally");
            }
            info!(
                schedule = %schedule,
                in_flight = self.tracker.len(),
                "scheduler stopped"
            );
        }
    }

    /// Tracker of spawned tick handlers.
    ///
    /// Callers may spawn their own work onto it so a single `wait` covers both.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// The schedule currently being dispatched, if any.
    pub async fn schedule(&self) -> Option<CronSchedule> {
        match &*self.state.lock().await {
            State::Running { schedule, .. } => Some(schedule.clone()),
            _ => None,
        }
    }

    /// Whether the dispatch loop is running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Running { .. })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep until each fire time and spawn the handler.
async fn dispatch_loop(
    schedule: CronSchedule,
    handler: TickHandler,
    stop: CancellationToken,
    tracker: TaskTracker,
) {
    debug!(schedule = %schedule, "dispatch loop starting");

    let mut sequence = 0u64;
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        // Timers may wake a little early; never fire the same slot twice.
        let from = match last_fired {
            Some(fired) if fired > now => fired,
            _ => now,
        };

        let Some(next) = schedule.next_after(from) else {
            warn!(schedule = %schedule, "schedule has no upcoming fire times");
            break;
        };

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %next, wait_ms = wait.as_millis() as u64, "waiting for next tick");

        tokio::select! {
            _ = stop.cancelled() => {
                debug!("dispatch loop received stop");
                break;
            }
            _ = sleep(wait) => {}
        }

        sequence += 1;
        last_fired = Some(next);

        let tick = Tick {
            sequence,
            scheduled_for: next,
        };
        debug!(sequence, scheduled_for = %next, "tick");
        tracker.spawn(handler(tick));
    }

    debug!(schedule = %schedule, ticks = sequence, "dispatch loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> TickHandler {
        Arc::new(|_tick| Box::pin(async {}))
    }

    #[tokio::test]
    async fn test_new_scheduler_is_idle() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.is_running().await);
        assert!(scheduler.schedule().await.is_none());
    }

    #[tokio::test]
    async fn test_start_reports_schedule() {
        let scheduler = Scheduler::new();
        scheduler
            .start("0 */30 * * * *", noop_handler())
            .await
            .unwrap();

        assert!(scheduler.is_running().await);
        assert_eq!(
            scheduler.schedule().await.unwrap().expression(),
            "0 */30 * * * *"
        );

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_parse_error_leaves_scheduler_idle() {
        let scheduler = Scheduler::new();
        let err = scheduler
            .start("not cron", noop_handler())
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::ScheduleParse { .. }));
        assert!(!scheduler.is_running().await);

        // A valid schedule can still be started afterwards.
        scheduler
            .start("0 */30 * * * *", noop_handler())
            .await
            .unwrap();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_harmless() {
        let scheduler = Scheduler::new();
        scheduler.stop().await;
        assert!(matches!(
            scheduler.start("* * * * * *", noop_handler()).await,
            Err(SchedulerError::Stopped)
        ));
    }
}
