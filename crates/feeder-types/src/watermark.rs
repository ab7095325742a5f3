//! Per-shard resume points.
//!
//! A watermark is the latest source modification time that was fully
//! delivered for a shard. The next run selects rows modified at or after it.
//! Watermarks are kept at millisecond precision so the in-memory value and the
//! persisted ISO-8601 text always compare equal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeederError;

/// Resume point for one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// The "beginning of time" sentinel used for shards with no checkpoint.
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Create a watermark from a UTC timestamp, truncated to milliseconds.
    pub fn from_datetime(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.trunc_subsecs(3))
    }

    /// Parse the ISO-8601 text form.
    pub fn parse(value: &str) -> Result<Self, FeederError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|e| FeederError::InvalidInput(format!("invalid watermark '{value}': {e}")))
    }

    /// The timestamp this watermark represents, for binding into queries.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// ISO-8601 with millisecond precision and a `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// True if this is the epoch sentinel.
    pub fn is_epoch(&self) -> bool {
        *self == Self::epoch()
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl FromStr for Watermark {
    type Err = FeederError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Watermark {
    type Error = FeederError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Watermark> for String {
    fn from(watermark: Watermark) -> Self {
        watermark.to_iso8601()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_format() {
        let epoch = Watermark::epoch();
        assert_eq!(epoch.to_string(), "1970-01-01T00:00:00.000Z");
        assert!(epoch.is_epoch());
        assert_eq!(Watermark::default(), epoch);
    }

    #[test]
    fn test_parse_iso8601() {
        let wm: Watermark = "2024-03-01T12:30:45.123Z".parse().unwrap();
        assert_eq!(wm.to_iso8601(), "2024-03-01T12:30:45.123Z");

        // Offsets are normalized to UTC
        let wm = Watermark::parse("2024-03-01T14:30:45.123+02:00").unwrap();
        assert_eq!(wm.to_iso8601(), "2024-03-01T12:30:45.123Z");
    }

    #[test]
    fn test_parse_invalid() {
        let err = Watermark::parse("yesterday").unwrap_err();
        assert!(matches!(err, FeederError::InvalidInput(_)));
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_truncates_to_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::microseconds(123_456);
        let wm = Watermark::from_datetime(ts);
        assert_eq!(wm.to_iso8601(), "2024-01-02T03:04:05.123Z");

        // Round trip through text is lossless after truncation
        let reparsed = Watermark::parse(&wm.to_iso8601()).unwrap();
        assert_eq!(reparsed, wm);
    }

    #[test]
    fn test_ordering() {
        let earlier = Watermark::parse("2024-01-01T00:00:00.000Z").unwrap();
        let later = Watermark::parse("2024-01-01T00:00:00.001Z").unwrap();
        assert!(earlier < later);
        assert_eq!(earlier.max(later), later);
        assert!(Watermark::epoch() < earlier);
    }

    #[test]
    fn test_datetime_roundtrip() {
        let wm = Watermark::parse("2023-06-15T08:00:00.250Z").unwrap();
        assert_eq!(wm.as_datetime().timestamp_millis(), 1_686_816_000_250);
        assert_eq!(Watermark::from_datetime(wm.as_datetime()), wm);
    }

    #[test]
    fn test_serde_as_string() {
        let wm = Watermark::parse("2024-03-01T12:30:45.123Z").unwrap();
        let json = serde_json::to_string(&wm).unwrap();
        assert_eq!(json, "\"2024-03-01T12:30:45.123Z\"");

        let decoded: Watermark = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, wm);

        assert!(serde_json::from_str::<Watermark>("\"not a date\"").is_err());
    }
}
