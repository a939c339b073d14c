//! Timestamp formatting utilities
//!
//! Every format here is ISO-8601 compatible with at least millisecond
//! precision, or a numeric Unix time, so lines stay sortable and parseable
//! by log aggregation tools.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Standardized timestamp format options
///
/// # Examples
///
/// ```
/// use log_fabric::core::TimestampFormat;
/// use chrono::{TimeZone, Utc};
///
/// let ts = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap();
/// assert_eq!(TimestampFormat::Iso8601.format(&ts), "2025-01-08T10:30:45.000Z");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// ISO 8601 with microseconds: `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// RFC 3339 with nanoseconds: `2025-01-08T10:30:45.123456789Z`
    Rfc3339Nanos,

    /// Unix timestamp in nanoseconds: `1736332245123456789`
    UnixNanos,
}

impl TimestampFormat {
    /// Format a `DateTime<Utc>` according to this format
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Iso8601Micros => datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            TimestampFormat::Rfc3339Nanos => datetime.to_rfc3339_opts(SecondsFormat::Nanos, true),
            TimestampFormat::UnixNanos => datetime
                .timestamp_nanos_opt()
                .unwrap_or_else(|| datetime.timestamp_micros().saturating_mul(1_000))
                .to_string(),
        }
    }

    /// Check if this is a Unix-based numeric format
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, TimestampFormat::UnixNanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456789 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::nanoseconds(123_456_789)
    }

    #[test]
    fn test_iso8601_format() {
        let result = TimestampFormat::Iso8601.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123Z");
    }

    #[test]
    fn test_iso8601_micros_format() {
        let result = TimestampFormat::Iso8601Micros.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123456Z");
    }

    #[test]
    fn test_rfc3339_nanos_format() {
        let result = TimestampFormat::Rfc3339Nanos.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123456789Z");
    }

    #[test]
    fn test_unix_nanos_format() {
        let result = TimestampFormat::UnixNanos.format(&fixed_datetime());
        let parsed: i64 = result.parse().expect("valid unix nanos timestamp");
        assert_eq!(parsed % 1_000_000_000, 123_456_789);
        assert!(TimestampFormat::UnixNanos.is_numeric());
    }

    #[test]
    fn test_default_is_iso8601() {
        assert_eq!(TimestampFormat::default(), TimestampFormat::Iso8601);
    }
}
