use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};

use crate::error::ScheduleError;

/// A daily time-of-day window, e.g. 10:00 to 12:00.
///
/// A window whose stop time is earlier than its start time spans midnight
/// (22:00 to 03:00 ends on the following day).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    stop: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, stop: NaiveTime) -> Result<Self, ScheduleError> {
        if start == stop {
            return Err(ScheduleError::EmptyWindow { at: start });
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn stop(&self) -> NaiveTime {
        self.stop
    }

    pub fn spans_midnight(&self) -> bool {
        self.stop < self.start
    }

    pub fn contains_time(&self, time: NaiveTime) -> bool {
        if self.spans_midnight() {
            time >= self.start || time <= self.stop
        } else {
            time >= self.start && time <= self.stop
        }
    }

    /// Concrete start and stop of the window occurrence relevant for `at`.
    ///
    /// The window is anchored on the date of `at`. For windows spanning midnight,
    /// a time in the early-morning part belongs to the occurrence that started the
    /// previous day.
    pub(crate) fn bounds_around(&self, at: &DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
        let mut date = at.date_naive();
        if self.spans_midnight() && at.time() <= self.stop {
            date = date.pred_opt().unwrap_or(date);
        }

        let start = local_at(date, self.start);
        let stop_date = if self.spans_midnight() {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        };
        (start, local_at(stop_date, self.stop))
    }

    /// Start of the window on the day after the occurrence starting at `start`.
    pub(crate) fn next_day_start(&self, start: &DateTime<Local>) -> DateTime<Local> {
        let date = start.date_naive();
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        local_at(next, self.start)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M:%S"), self.stop.format("%H:%M:%S"))
    }
}

impl FromStr for TimeWindow {
    type Err = ScheduleError;

    /// Parse "HH:MM[:SS]-HH:MM[:SS]".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ScheduleError::InvalidWindow {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (start, stop) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected '<start>-<stop>'"))?;
        let start = parse_time_of_day(start).ok_or_else(|| invalid("start is not HH:MM[:SS]"))?;
        let stop = parse_time_of_day(stop).ok_or_else(|| invalid("stop is not HH:MM[:SS]"))?;
        TimeWindow::new(start, stop)
    }
}

/// Parse "HH:MM" or "HH:MM:SS".
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Next occurrence of `time` after `now`: today if still ahead, tomorrow otherwise.
pub fn next_time_of_day(now: &DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    let today = local_at(now.date_naive(), time);
    if today > *now {
        return today;
    }
    let date = now.date_naive();
    local_at(date.succ_opt().unwrap_or(date), time)
}

/// Resolve a wall-clock time on `date` in the local timezone.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times inside a
/// DST gap move forward by the size of a typical gap.
pub(crate) fn local_at(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let naive = NaiveDateTime::new(date, time);
    if let Some(resolved) = Local.from_local_datetime(&naive).earliest() {
        return resolved;
    }
    let shifted = naive + TimeDelta::hours(1);
    Local
        .from_local_datetime(&shifted)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}
