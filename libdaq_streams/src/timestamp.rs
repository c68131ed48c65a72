use serde::{Deserialize, Serialize};
use std::fmt::Display;
use time::format_description::FormatItem;
use time::macros::{datetime, format_description};
use time::{Duration, PrimitiveDateTime};

use super::constants::{CHUNK_DURATION_HOURS, NANOS_PER_HOUR, NANOS_PER_SECOND, TICK_NANOS};
use super::error::TimestampError;

/// The reference epoch of the device clocks
pub const REFERENCE_EPOCH: PrimitiveDateTime = datetime!(1904-01-01 0:00);

/// Chunk times are encoded in file names with dashes in place of colons
const CHUNK_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

const MAX_FRACTION_DIGITS: usize = 9;

/// Timestamp is the common time base of every stream.
///
/// It counts nanoseconds since the [REFERENCE_EPOCH]. Using an integer count keeps
/// timestamps exact, totally ordered and hashable, which the stitcher relies on when
/// comparing rows across chunk boundaries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Build a timestamp from the device clock fields: whole seconds plus 32 us ticks
    pub fn from_device_time(seconds: u32, ticks: u16) -> Self {
        Self(seconds as i64 * NANOS_PER_SECOND + ticks as i64 * TICK_NANOS)
    }

    /// Convert fractional seconds to a timestamp, rounding to the nearest nanosecond
    pub fn try_from_seconds(seconds: f64) -> Result<Self, TimestampError> {
        let nanos = (seconds * NANOS_PER_SECOND as f64).round();
        if !nanos.is_finite() || nanos >= i64::MAX as f64 || nanos <= i64::MIN as f64 {
            return Err(TimestampError::OutOfRange);
        }
        Ok(Self(nanos as i64))
    }

    /// Parse a decimal count of seconds since the reference epoch.
    ///
    /// The integer and fractional parts are parsed separately so no precision is lost
    /// to floating point; digits past nanosecond precision are truncated. Exponent
    /// notation is accepted but goes through `f64`.
    pub fn parse_seconds(text: &str) -> Result<Self, TimestampError> {
        let text = text.trim();
        if text.contains(['e', 'E']) {
            let seconds: f64 = text
                .parse()
                .map_err(|_| TimestampError::Invalid(text.to_string()))?;
            return Self::try_from_seconds(seconds);
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(TimestampError::Invalid(text.to_string()));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| TimestampError::OutOfRange)?
        };
        let frac_len = frac_part.len().min(MAX_FRACTION_DIGITS);
        let mut frac: i64 = if frac_len == 0 {
            0
        } else {
            frac_part[..frac_len]
                .parse()
                .map_err(|_| TimestampError::Invalid(text.to_string()))?
        };
        frac *= 10_i64.pow((MAX_FRACTION_DIGITS - frac_len) as u32);

        let nanos = whole
            .checked_mul(NANOS_PER_SECOND)
            .and_then(|n| n.checked_add(frac))
            .ok_or(TimestampError::OutOfRange)?;
        Ok(Self(if negative { -nanos } else { nanos }))
    }

    pub fn from_datetime(time: PrimitiveDateTime) -> Result<Self, TimestampError> {
        let nanos = (time - REFERENCE_EPOCH).whole_nanoseconds();
        i64::try_from(nanos)
            .map(Self)
            .map_err(|_| TimestampError::OutOfRange)
    }

    pub fn to_datetime(&self) -> Option<PrimitiveDateTime> {
        REFERENCE_EPOCH.checked_add(Duration::nanoseconds(self.0))
    }

    /// Parse a chunk time as written in a chunk file name (e.g. `2022-06-13T12-00-00`)
    pub fn parse_chunk_time(text: &str) -> Result<Self, TimestampError> {
        let time = PrimitiveDateTime::parse(text, CHUNK_TIME_FORMAT).map_err(|source| {
            TimestampError::ChunkTime {
                text: text.to_string(),
                source,
            }
        })?;
        Self::from_datetime(time)
    }

    /// Format the timestamp the way chunk file names encode it
    pub fn format_chunk_time(&self) -> Result<String, TimestampError> {
        let time = self.to_datetime().ok_or(TimestampError::OutOfRange)?;
        Ok(time.format(CHUNK_TIME_FORMAT)?)
    }

    /// The whole-hour acquisition chunk this timestamp falls in
    pub fn chunk_start(&self) -> Self {
        let duration = CHUNK_DURATION_HOURS * NANOS_PER_HOUR;
        Self(self.0.div_euclid(duration) * duration)
    }

    pub fn saturating_sub(&self, nanos: i64) -> Self {
        Self(self.0.saturating_sub(nanos))
    }

    pub fn saturating_add(&self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(time) => write!(f, "{time}"),
            None => write!(f, "{}ns", self.0),
        }
    }
}

/// Returns every acquisition chunk start from the chunk of `start` through the chunk of
/// `end`, both inclusive.
pub fn chunk_range(start: Timestamp, end: Timestamp) -> Vec<Timestamp> {
    let step = CHUNK_DURATION_HOURS * NANOS_PER_HOUR;
    let last = end.chunk_start();
    let mut current = start.chunk_start();
    let mut chunks = Vec::new();
    while current <= last {
        chunks.push(current);
        current = Timestamp::from_nanos(current.as_nanos() + step);
    }
    chunks
}

/// Which bounds of a [TimeRange] are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusive {
    Both,
    /// `[start, end)`
    #[default]
    Left,
    Right,
    Neither,
}

/// A window of time; either bound may be open (unbounded)
///
/// When `inclusive` is left unset the range is `[start, end)`, unless a loader
/// supplies its configured default with [TimeRange::or_inclusive].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub inclusive: Option<Inclusive>,
}

impl TimeRange {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self {
            start,
            end,
            inclusive: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_inclusive(mut self, inclusive: Inclusive) -> Self {
        self.inclusive = Some(inclusive);
        self
    }

    /// Fill in the bound inclusivity if the range does not set one
    pub fn or_inclusive(mut self, inclusive: Inclusive) -> Self {
        self.inclusive.get_or_insert(inclusive);
        self
    }

    pub fn inclusive(&self) -> Inclusive {
        self.inclusive.unwrap_or_default()
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn includes_start(&self) -> bool {
        matches!(self.inclusive(), Inclusive::Both | Inclusive::Left)
    }

    pub fn includes_end(&self) -> bool {
        matches!(self.inclusive(), Inclusive::Both | Inclusive::Right)
    }

    pub fn is_after_start(&self, time: &Timestamp) -> bool {
        match self.start {
            Some(start) if self.includes_start() => *time >= start,
            Some(start) => *time > start,
            None => true,
        }
    }

    pub fn is_before_end(&self, time: &Timestamp) -> bool {
        match self.end {
            Some(end) if self.includes_end() => *time <= end,
            Some(end) => *time < end,
            None => true,
        }
    }

    pub fn contains(&self, time: &Timestamp) -> bool {
        self.is_after_start(time) && self.is_before_end(time)
    }
}
