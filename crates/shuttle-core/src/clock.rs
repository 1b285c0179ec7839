//! Fixed-offset civil timestamps.
//!
//! Every timestamp that is persisted or sent to the backend is rendered as
//! `YYYY-MM-DD HH:MM:SS` in UTC+8, independent of the device timezone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Offset of the civil clock from UTC, in seconds.
pub const CIVIL_OFFSET_SECS: i32 = 8 * 3600;

/// Wire and storage format of a civil timestamp.
pub const CIVIL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of "now" for the session machine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A civil (UTC+8, second precision) timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilTime(NaiveDateTime);

impl CivilTime {
    /// Convert an instant into UTC+8 civil time, truncated to whole seconds.
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        let local = instant.naive_utc() + chrono::Duration::seconds(CIVIL_OFFSET_SECS as i64);
        // Sub-second precision never survives a round-trip through the wire format.
        Self(local.with_nanosecond(0).unwrap_or(local))
    }

    /// Civil time of `clock.now()`.
    pub fn now(clock: &dyn Clock) -> Self {
        Self::from_utc(clock.now())
    }

    /// The same instant with its offset attached.
    pub fn to_fixed_offset(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(CIVIL_OFFSET_SECS)?;
        self.0.and_local_timezone(offset).single()
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CIVIL_FORMAT))
    }
}

impl FromStr for CivilTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), CIVIL_FORMAT).map(Self)
    }
}

impl Serialize for CivilTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CivilTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
