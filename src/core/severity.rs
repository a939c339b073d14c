//! Severity mapping from [`LogLevel`] to backend encodings
//!
//! Both mappings are total: every level maps, and any level name that is
//! not recognized maps to the INFO equivalent.

use super::log_level::LogLevel;

/// Syslog severities (RFC 5424, section 6.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyslogSeverity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl SyslogSeverity {
    pub fn from_level(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => SyslogSeverity::Debug,
            LogLevel::Info => SyslogSeverity::Info,
            LogLevel::Warn => SyslogSeverity::Warning,
            LogLevel::Error => SyslogSeverity::Err,
        }
    }

    /// Map a level by name; unrecognized names map to `Info`
    pub fn from_name(name: &str) -> Self {
        name.parse::<LogLevel>()
            .map(Self::from_level)
            .unwrap_or(SyslogSeverity::Info)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyslogSeverity::Emergency => "EMERG",
            SyslogSeverity::Alert => "ALERT",
            SyslogSeverity::Critical => "CRIT",
            SyslogSeverity::Err => "ERR",
            SyslogSeverity::Warning => "WARNING",
            SyslogSeverity::Notice => "NOTICE",
            SyslogSeverity::Info => "INFO",
            SyslogSeverity::Debug => "DEBUG",
        }
    }
}

/// OTLP `SeverityNumber` for INFO, used as the default
pub const OTLP_SEVERITY_INFO: i32 = 9;

/// OTLP `SeverityNumber` for a level
pub fn otlp_severity_number(level: LogLevel) -> i32 {
    match level {
        LogLevel::Debug => 5,
        LogLevel::Info => OTLP_SEVERITY_INFO,
        LogLevel::Warn => 13,
        LogLevel::Error => 17,
    }
}

/// OTLP `SeverityNumber` for a level name; unrecognized names map to INFO
pub fn otlp_severity_number_for_name(name: &str) -> i32 {
    name.parse::<LogLevel>()
        .map(otlp_severity_number)
        .unwrap_or(OTLP_SEVERITY_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syslog_mapping() {
        assert_eq!(SyslogSeverity::from_level(LogLevel::Debug).code(), 7);
        assert_eq!(SyslogSeverity::from_level(LogLevel::Info).code(), 6);
        assert_eq!(SyslogSeverity::from_level(LogLevel::Warn).code(), 4);
        assert_eq!(SyslogSeverity::from_level(LogLevel::Error).code(), 3);
    }

    #[test]
    fn test_syslog_unrecognized_defaults_to_info() {
        assert_eq!(SyslogSeverity::from_name("TRACE"), SyslogSeverity::Info);
        assert_eq!(SyslogSeverity::from_name(""), SyslogSeverity::Info);
        assert_eq!(SyslogSeverity::from_name("warn"), SyslogSeverity::Warning);
    }

    #[test]
    fn test_otlp_mapping() {
        assert_eq!(otlp_severity_number(LogLevel::Debug), 5);
        assert_eq!(otlp_severity_number(LogLevel::Info), 9);
        assert_eq!(otlp_severity_number(LogLevel::Warn), 13);
        assert_eq!(otlp_severity_number(LogLevel::Error), 17);
        assert_eq!(otlp_severity_number_for_name("FATAL"), 9);
    }
}
