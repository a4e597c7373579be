use std::time::Duration;

/// Time unit for periodic function intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    /// Parse TimeUnit from its full lowercase name: "milliseconds", "seconds", "minutes", "hours", "days".
    /// For shorthand notations like "5s", "10m", use `parse_duration` instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "milliseconds" => Ok(TimeUnit::Milliseconds),
            "seconds" => Ok(TimeUnit::Seconds),
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            _ => Err(format!("Invalid time unit: {}", s)),
        }
    }
}

impl TimeUnit {
    pub fn to_millis(&self, value: u64) -> u64 {
        match self {
            TimeUnit::Milliseconds => value,
            TimeUnit::Seconds => value.saturating_mul(1000),
            TimeUnit::Minutes => value.saturating_mul(60_000),
            TimeUnit::Hours => value.saturating_mul(3_600_000),
            TimeUnit::Days => value.saturating_mul(86_400_000),
        }
    }

    pub fn to_duration(&self, value: u64) -> Duration {
        Duration::from_millis(self.to_millis(value))
    }

    /// Parse a duration string like "5s", "10m", "2h", "500ms"
    /// Returns (value, TimeUnit) if successful
    ///
    /// Only lowercase suffixes are accepted and no whitespace is allowed between
    /// number and suffix.
    pub fn parse_duration(s: &str) -> Option<(u64, TimeUnit)> {
        let (value, suffix) = split_number(s)?;

        let time_unit = match suffix {
            "ms" => TimeUnit::Milliseconds,
            "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "d" => TimeUnit::Days,
            _ => return None,
        };

        Some((value, time_unit))
    }

    /// Parse a periodic interval.
    ///
    /// Accepts the shorthand forms of [`TimeUnit::parse_duration`], frequencies
    /// ("10hz", "2khz") and bare numbers, which are read as milliseconds.
    /// Frequencies above 1kHz round down to a zero period and are rejected.
    pub fn parse_interval(s: &str) -> Option<Duration> {
        let s = s.trim();
        if let Ok(millis) = s.parse::<u64>() {
            return Some(Duration::from_millis(millis));
        }
        if let Some((value, unit)) = Self::parse_duration(s) {
            return Some(unit.to_duration(value));
        }

        let (value, suffix) = split_number(s)?;
        let hertz = match suffix {
            "hz" => value,
            "khz" => value.checked_mul(1000)?,
            _ => return None,
        };
        if hertz == 0 {
            return None;
        }
        let period = 1000 / hertz;
        (period > 0).then(|| Duration::from_millis(period))
    }
}

fn split_number(s: &str) -> Option<(u64, &str)> {
    let s = s.trim();
    let split_pos = s.find(|c: char| !c.is_ascii_digit())?;
    if split_pos == 0 {
        return None;
    }

    let (num_str, unit_str) = s.split_at(split_pos);
    let value = num_str.parse::<u64>().ok()?;
    Some((value, unit_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_durations() {
        assert_eq!(TimeUnit::parse_duration("500ms"), Some((500, TimeUnit::Milliseconds)));
        assert_eq!(TimeUnit::parse_duration("5s"), Some((5, TimeUnit::Seconds)));
        assert_eq!(TimeUnit::parse_duration("2h"), Some((2, TimeUnit::Hours)));
        assert_eq!(TimeUnit::parse_duration("5S"), None);
        assert_eq!(TimeUnit::parse_duration("ms"), None);
        assert_eq!(TimeUnit::parse_duration("15"), None);
    }

    #[test]
    fn parses_intervals_and_frequencies() {
        assert_eq!(TimeUnit::parse_interval("250"), Some(Duration::from_millis(250)));
        assert_eq!(TimeUnit::parse_interval("3m"), Some(Duration::from_secs(180)));
        assert_eq!(TimeUnit::parse_interval("10hz"), Some(Duration::from_millis(100)));
        assert_eq!(TimeUnit::parse_interval("1khz"), Some(Duration::from_millis(1)));
        assert_eq!(TimeUnit::parse_interval("2khz"), None);
        assert_eq!(TimeUnit::parse_interval("0hz"), None);
        assert_eq!(TimeUnit::parse_interval("fast"), None);
    }

    #[test]
    fn full_unit_names_parse() {
        assert_eq!("Minutes".parse::<TimeUnit>(), Ok(TimeUnit::Minutes));
        assert!("fortnights".parse::<TimeUnit>().is_err());
        assert_eq!(TimeUnit::Days.to_millis(1), 86_400_000);
    }
}
