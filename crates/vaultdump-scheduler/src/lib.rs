//! Cron-driven tick dispatcher for vaultdump.
//!
//! This crate provides a scheduler that:
//! - Parses seconds-resolution cron expressions once at startup
//! - Fires a handler on every tick without waiting for earlier ticks to finish
//! - Tracks spawned handlers so callers can wait for them during shutdown
//! - Stops once and is never restarted

mod error;
mod scheduler;
mod types;

pub use error::SchedulerError;
pub use scheduler::{Scheduler, TickHandler};
pub use types::{CronSchedule, DEFAULT_SCHEDULE, Tick};
