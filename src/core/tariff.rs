use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde_with::DeserializeFromStr;

use crate::core::error::Error;

/// Wall-clock time of day in the `HH:MM` notation.
#[must_use]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, DeserializeFromStr)]
pub struct TimeOfDay(pub NaiveTime);

impl TimeOfDay {
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }
}

impl FromStr for TimeOfDay {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M").map(Self)
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Debug for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Off-peak charging window.
///
/// Both ends are same-day times and the start must not be after the end. The ordering is only
/// checked by [`TariffWindow::duration`], so that a misconfigured window fails the cycle
/// as a configuration error.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize)]
pub struct TariffWindow {
    #[serde(rename = "off_peak_start")]
    pub start: TimeOfDay,

    #[serde(rename = "off_peak_end")]
    pub end: TimeOfDay,
}

impl TariffWindow {
    pub const fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn duration(self) -> Result<TimeDelta, Error> {
        if self.start > self.end {
            return Err(Error::configuration(format!(
                "off-peak start time {} is after off-peak end time {}",
                self.start, self.end,
            )));
        }
        let duration = self.end.0 - self.start.0;
        if duration <= TimeDelta::zero() {
            return Err(Error::configuration(format!(
                "off-peak window {}–{} has zero duration",
                self.start, self.end,
            )));
        }
        Ok(duration)
    }

    /// Check whether the window is active at the specified time, both ends inclusive.
    ///
    /// An inverted window contains nothing.
    pub fn contains(self, time: NaiveTime) -> bool {
        (self.start.0 <= time) && (time <= self.end.0)
    }
}
