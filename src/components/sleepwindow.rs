//! Wall-clock times and the scheduled sleep window.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Serialize, Serializer};

/// A time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Returns `None` when the hour or minute is out of range.
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }
}

impl FromStr for ClockTime {
    type Err = chrono::ParseError;

    /// Parses `HH:MM` (24 hour clock).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M").map(Self::from_naive)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Daily quiet hours, `[begin, end)`.
///
/// A window whose end is earlier than its begin wraps past midnight
/// (22:00 to 06:00). A window with `begin == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SleepWindow {
    pub begin: ClockTime,
    pub end: ClockTime,
}

impl SleepWindow {
    pub fn new(begin: ClockTime, end: ClockTime) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, now: ClockTime) -> bool {
        let now = now.minutes_since_midnight();
        let begin = self.begin.minutes_since_midnight();
        let end = self.end.minutes_since_midnight();
        if begin == end {
            true
        } else if begin < end {
            now >= begin && now < end
        } else {
            now >= begin || now < end
        }
    }
}
