use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, Month, OffsetDateTime};

use crate::error::PipelineError;

/// A calendar day in the canonical `YYYY-MM-DD` form shared by the
/// document store keys and the question documents themselves.
///
/// Parsing is strict: four-digit year, zero-padded month and day, `-`
/// separators. The legacy `MM-DD-YYYY` convention that survives in older
/// store paths is recognized only to be rejected by name, so callers can
/// tell a migration problem from plain garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuizDate(Date);

impl QuizDate {
    /// Parse a canonical `YYYY-MM-DD` date string.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidDateFormat`] for any other shape,
    /// including legacy `MM-DD-YYYY` strings and non-existent days.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let bytes = value.as_bytes();
        if is_legacy_shape(bytes) {
            return Err(PipelineError::InvalidDateFormat(format!(
                "{value:?} uses the legacy MM-DD-YYYY convention; canonical YYYY-MM-DD is required"
            )));
        }
        if !is_canonical_shape(bytes) {
            return Err(PipelineError::InvalidDateFormat(format!(
                "{value:?} is not a canonical YYYY-MM-DD date"
            )));
        }

        let year: i32 = value[..4]
            .parse()
            .map_err(|_| PipelineError::InvalidDateFormat(value.to_string()))?;
        let month_number: u8 = value[5..7]
            .parse()
            .map_err(|_| PipelineError::InvalidDateFormat(value.to_string()))?;
        let day: u8 = value[8..10]
            .parse()
            .map_err(|_| PipelineError::InvalidDateFormat(value.to_string()))?;

        if month_number > 12 {
            // A swapped month/day pair inside the canonical shape, e.g.
            // 2024-25-12, is the other trace the legacy data leaves behind.
            return Err(PipelineError::InvalidDateFormat(format!(
                "{value:?} looks like the legacy MM-DD-YYYY convention; canonical YYYY-MM-DD is required"
            )));
        }

        let month = Month::try_from(month_number).map_err(|_| {
            PipelineError::InvalidDateFormat(format!("{value:?} has month {month_number}"))
        })?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| {
            PipelineError::InvalidDateFormat(format!("{value:?} is not a real calendar day"))
        })?;

        Ok(Self(date))
    }

    /// Today's UTC calendar day, the default starting point for slot search.
    #[must_use]
    pub fn today() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    /// The next calendar day, or `None` at the end of the supported range.
    #[must_use]
    pub fn next_day(self) -> Option<Self> {
        self.0.next_day().map(Self)
    }

    #[must_use]
    pub fn as_date(self) -> Date {
        self.0
    }
}

impl From<Date> for QuizDate {
    fn from(date: Date) -> Self {
        Self(date)
    }
}

impl Display for QuizDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl Serialize for QuizDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuizDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

fn is_canonical_shape(bytes: &[u8]) -> bool {
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

fn is_legacy_shape(bytes: &[u8]) -> bool {
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            2 | 5 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}
