//! Query value types for time-bucket and directional key retrieval.

use super::ContentKey;
use time::{Duration, OffsetDateTime, Time};

/// Granularity of a time bucket. The bucket prefix is the leading part of
/// the key URL, so listing by prefix selects exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    pub fn duration(self) -> Duration {
        match self {
            TimeUnit::Days => Duration::days(1),
            TimeUnit::Hours => Duration::hours(1),
            TimeUnit::Minutes => Duration::minutes(1),
            TimeUnit::Seconds => Duration::seconds(1),
        }
    }

    /// Start of the bucket containing `time`.
    pub fn truncate(self, time: OffsetDateTime) -> OffsetDateTime {
        let (h, m, s) = (time.hour(), time.minute(), time.second());
        let clock = match self {
            TimeUnit::Days => Time::MIDNIGHT,
            TimeUnit::Hours => Time::from_hms(h, 0, 0).unwrap_or(Time::MIDNIGHT),
            TimeUnit::Minutes => Time::from_hms(h, m, 0).unwrap_or(Time::MIDNIGHT),
            TimeUnit::Seconds => Time::from_hms(h, m, s).unwrap_or(Time::MIDNIGHT),
        };
        time.replace_time(clock)
    }

    /// Key-URL prefix of the bucket containing `time`, with a trailing `/`.
    pub fn format(self, time: OffsetDateTime) -> String {
        let date = format!(
            "{:04}/{:02}/{:02}/",
            time.year(),
            u8::from(time.month()),
            time.day()
        );
        match self {
            TimeUnit::Days => date,
            TimeUnit::Hours => format!("{date}{:02}/", time.hour()),
            TimeUnit::Minutes => format!("{date}{:02}/{:02}/", time.hour(), time.minute()),
            TimeUnit::Seconds => format!(
                "{date}{:02}/{:02}/{:02}/",
                time.hour(),
                time.minute(),
                time.second()
            ),
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(TimeUnit::Days),
            "hour" | "hours" => Ok(TimeUnit::Hours),
            "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "second" | "seconds" => Ok(TimeUnit::Seconds),
            other => Err(format!("unknown time unit: {other}")),
        }
    }
}

/// Items of one time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeQuery {
    pub channel_name: String,
    pub start_time: OffsetDateTime,
    pub unit: TimeUnit,
    pub count: usize,
    /// Inclusive upper bound. Defaults to the end of the bucket.
    pub limit_key: Option<ContentKey>,
    pub stable: bool,
}

impl TimeQuery {
    pub fn new(
        channel_name: impl Into<String>,
        start_time: OffsetDateTime,
        unit: TimeUnit,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            start_time,
            unit,
            count: usize::MAX,
            limit_key: None,
            stable: true,
        }
    }
}

/// Up to `count` keys strictly after (`next`) or before `start_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionQuery {
    pub channel_name: String,
    pub start_key: ContentKey,
    pub count: usize,
    pub next: bool,
    pub stable: bool,
    /// Filled in from the channel config by the channel service.
    pub ttl_days: u32,
}

impl DirectionQuery {
    pub fn next(channel_name: impl Into<String>, start_key: ContentKey, count: usize) -> Self {
        Self {
            channel_name: channel_name.into(),
            start_key,
            count,
            next: true,
            stable: true,
            ttl_days: 0,
        }
    }

    pub fn previous(channel_name: impl Into<String>, start_key: ContentKey, count: usize) -> Self {
        Self {
            next: false,
            ..Self::next(channel_name, start_key, count)
        }
    }

    pub fn with_stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_start_key(mut self, start_key: ContentKey) -> Self {
        self.start_key = start_key;
        self
    }

    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.ttl_days = ttl_days;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_bucket_prefix_matches_key_url() {
        let t = datetime!(2024-05-06 07:08:09.010 UTC);
        let url = ContentKey::new(t, "abc").to_url();
        for unit in [TimeUnit::Days, TimeUnit::Hours, TimeUnit::Minutes, TimeUnit::Seconds] {
            assert!(url.starts_with(&unit.format(t)), "{unit:?}");
        }
        assert_eq!(TimeUnit::Hours.format(t), "2024/05/06/07/");
    }

    #[test]
    fn test_truncate() {
        let t = datetime!(2024-05-06 07:08:09.010 UTC);
        assert_eq!(TimeUnit::Days.truncate(t), datetime!(2024-05-06 00:00:00 UTC));
        assert_eq!(TimeUnit::Minutes.truncate(t), datetime!(2024-05-06 07:08:00 UTC));
        assert_eq!(TimeUnit::Seconds.truncate(t), datetime!(2024-05-06 07:08:09 UTC));
    }
}
