use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta};

use super::window::{next_time_of_day, TimeWindow};
use super::Schedule;
use crate::error::ScheduleError;

/// Describes how a periodic module function repeats.
///
/// ```ignore
/// let every_minute_in_the_morning = Periodic::every(Duration::from_secs(60))
///     .only_active_between(TimeWindow::new(ten, noon)?);
/// ```
#[derive(Debug, Clone)]
pub struct Periodic {
    interval: Duration,
    start: Start,
    window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Copy)]
enum Start {
    AfterOneInterval,
    At(DateTime<Local>),
    TimeOfDay(NaiveTime),
}

impl Periodic {
    /// Repeat every `interval`. The first run happens one interval from now unless a start is given.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            start: Start::AfterOneInterval,
            window: None,
        }
    }

    pub fn starting_at(mut self, at: DateTime<Local>) -> Self {
        self.start = Start::At(at);
        self
    }

    /// First run at the next occurrence of `time` (today if still ahead, otherwise tomorrow).
    pub fn starting_at_time_of_day(mut self, time: NaiveTime) -> Self {
        self.start = Start::TimeOfDay(time);
        self
    }

    pub fn only_active_between(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        self.window.as_ref()
    }

    /// Resolve into a concrete schedule relative to `now`.
    pub fn into_schedule(self, now: DateTime<Local>) -> Result<Schedule, ScheduleError> {
        let start = match self.start {
            Start::AfterOneInterval => {
                let step = TimeDelta::from_std(self.interval).map_err(|_| {
                    ScheduleError::IntervalOutOfRange {
                        millis: self.interval.as_millis(),
                    }
                })?;
                now + step
            }
            Start::At(at) => at,
            Start::TimeOfDay(time) => next_time_of_day(&now, time),
        };

        match self.window {
            Some(window) => Schedule::repeated_in_window(start, self.interval, window),
            None => Schedule::repeated(start, self.interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_start_is_one_interval_from_now() {
        let now = Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let schedule = Periodic::every(Duration::from_secs(30)).into_schedule(now).unwrap();
        assert!(schedule.repeats());
        assert_eq!(schedule.execution_time(), now + TimeDelta::seconds(30));
    }

    #[test]
    fn time_of_day_start_picks_next_occurrence() {
        let now = Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let schedule = Periodic::every(Duration::from_secs(30))
            .starting_at_time_of_day(NaiveTime::from_hms_opt(7, 0, 0).unwrap())
            .into_schedule(now)
            .unwrap();
        assert_eq!(
            schedule.execution_time(),
            Local.with_ymd_and_hms(2024, 6, 2, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn zero_interval_fails_to_resolve() {
        let result = Periodic::every(Duration::ZERO).into_schedule(Local::now());
        assert_eq!(result.unwrap_err(), ScheduleError::ZeroInterval);
    }
}
