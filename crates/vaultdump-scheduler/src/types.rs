//! Scheduler types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::SchedulerError;

/// Fires at second zero of every half hour.
pub const DEFAULT_SCHEDULE: &str = "0 */30 * * * *";

/// A parsed, immutable cron schedule with seconds resolution.
///
/// Expressions have six fields (`sec min hour day-of-month month day-of-week`)
/// with an optional seventh year field.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse a cron expression.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(SchedulerError::ScheduleParse {
                expression: expression.to_string(),
                reason: "expression is empty".to_string(),
            });
        }

        let schedule =
            cron::Schedule::from_str(expression).map_err(|e| SchedulerError::ScheduleParse {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression this schedule was parsed from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// The next `count` fire times strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&after).take(count).collect()
    }
}

impl FromStr for CronSchedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// One firing of the schedule, handed to the tick handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based count of ticks fired by this scheduler.
    pub sequence: u64,
    /// The fire time the tick was scheduled for.
    pub scheduled_for: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_default_schedule_parses() {
        let schedule = CronSchedule::parse(DEFAULT_SCHEDULE).unwrap();
        assert_eq!(schedule.expression(), DEFAULT_SCHEDULE);
        assert_eq!(schedule.to_string(), DEFAULT_SCHEDULE);
    }

    #[test]
    fn test_default_schedule_fires_on_half_hours() {
        let schedule = CronSchedule::parse(DEFAULT_SCHEDULE).unwrap();

        assert_eq!(schedule.next_after(at(3, 4, 5)), Some(at(3, 30, 0)));
        assert_eq!(schedule.next_after(at(3, 45, 10)), Some(at(4, 0, 0)));
    }

    #[test]
    fn test_upcoming_is_ordered() {
        let schedule = CronSchedule::parse(DEFAULT_SCHEDULE).unwrap();
        let times = schedule.upcoming(at(3, 4, 5), 3);

        assert_eq!(times, vec![at(3, 30, 0), at(4, 0, 0), at(4, 30, 0)]);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let schedule: CronSchedule = "  */5 * * * * *\n".parse().unwrap();
        assert_eq!(schedule.expression(), "*/5 * * * * *");
    }

    #[test]
    fn test_empty_expression_rejected() {
        let err = CronSchedule::parse("   ").unwrap_err();
        assert!(matches!(err, SchedulerError::ScheduleParse { .. }));
    }

    #[test]
    fn test_garbage_expression_rejected() {
        let err = CronSchedule::parse("every thirty minutes").unwrap_err();
        match err {
            SchedulerError::ScheduleParse { expression, .. } => {
                assert_eq!(expression, "every thirty minutes")
            }
            other => panic!("expected ScheduleParse, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn next_fire_is_strictly_later(offset_secs in 0i64..(10 * 365 * 86_400)) {
            let schedule = CronSchedule::parse(DEFAULT_SCHEDULE).unwrap();
            let now = at(0, 0, 0) + Duration::seconds(offset_secs);
            let next = schedule.next_after(now).unwrap();

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::minutes(30));
        }

        #[test]
        fn every_second_schedule_fires_within_a_second(offset_millis in 0i64..86_400_000) {
            let schedule = CronSchedule::parse("* * * * * *").unwrap();
            let now = at(0, 0, 0) + Duration::milliseconds(offset_millis);
            let next = schedule.next_after(now).unwrap();

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::seconds(1));
        }
    }
}
