//! Time computation strategies for dispatcher tasks.
//!
//! A [`Schedule`] knows when a task is due next and whether it repeats. It has no
//! knowledge of what it schedules.

mod periodic;
mod window;

use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};

use crate::error::ScheduleError;

pub use periodic::Periodic;
pub use window::{next_time_of_day, parse_time_of_day, TimeWindow};

/// When a task runs: once at a fixed time, or repeatedly at an interval.
#[derive(Debug, Clone)]
pub enum Schedule {
    Once(ScheduleOnce),
    Repeated(RepeatedInterval),
}

impl Schedule {
    pub fn once(at: DateTime<Local>) -> Self {
        Schedule::Once(ScheduleOnce { execution_time: at })
    }

    /// Run once, as soon as the dispatcher gets to it.
    pub fn now() -> Self {
        Self::once(Local::now())
    }

    pub fn repeated(start: DateTime<Local>, interval: Duration) -> Result<Self, ScheduleError> {
        Ok(Schedule::Repeated(RepeatedInterval::new(start, interval, None)?))
    }

    /// Repeat at `interval`, but only inside the daily `window`.
    pub fn repeated_in_window(
        start: DateTime<Local>,
        interval: Duration,
        window: TimeWindow,
    ) -> Result<Self, ScheduleError> {
        Ok(Schedule::Repeated(RepeatedInterval::new(start, interval, Some(window))?))
    }

    pub fn execution_time(&self) -> DateTime<Local> {
        match self {
            Schedule::Once(once) => once.execution_time,
            Schedule::Repeated(repeated) => repeated.execution_time,
        }
    }

    pub fn repeats(&self) -> bool {
        matches!(self, Schedule::Repeated(_))
    }

    /// Advance to the next due time. No-op for one-shot schedules.
    pub fn update_execution_time(&mut self) {
        if let Schedule::Repeated(repeated) = self {
            repeated.update_execution_time();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleOnce {
    execution_time: DateTime<Local>,
}

/// Fixed-interval repetition, optionally gated to a daily time window.
///
/// Each update advances by exactly one interval from the previous due time. When the
/// dispatcher falls behind by several intervals, the new due time is still in the past
/// and the task fires again on the next pass until it has caught up; no ticks are
/// skipped or coalesced.
#[derive(Debug, Clone)]
pub struct RepeatedInterval {
    execution_time: DateTime<Local>,
    interval: TimeDelta,
    window: Option<TimeWindow>,
}

impl RepeatedInterval {
    fn new(
        start: DateTime<Local>,
        interval: Duration,
        window: Option<TimeWindow>,
    ) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        let interval = TimeDelta::from_std(interval).map_err(|_| ScheduleError::IntervalOutOfRange {
            millis: interval.as_millis(),
        })?;

        Ok(Self {
            execution_time: start,
            interval,
            window,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval.to_std().unwrap_or_default()
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        self.window.as_ref()
    }

    fn update_execution_time(&mut self) {
        let Some(window) = self.window else {
            self.execution_time += self.interval;
            return;
        };

        let (start, stop) = window.bounds_around(&self.execution_time);
        if self.execution_time >= start && self.execution_time <= stop {
            self.execution_time += self.interval;
            if self.execution_time > stop {
                self.execution_time = window.next_day_start(&start);
            }
        } else if self.execution_time < start {
            self.execution_time = start;
        } else {
            self.execution_time = window.next_day_start(&start);
        }
    }
}
