//! Line encodings for log records
//!
//! Provides the single-line encodings shared by the baseline sink and the
//! syslog handler:
//! - Logfmt: key=value pairs (default)
//! - Json: one JSON object per line
//! - Text: human-readable, optionally colored on a terminal

use super::log_level::LogLevel;
use super::record::LogRecord;
use super::timestamp::TimestampFormat;
use super::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Logfmt format (key=value pairs)
    ///
    /// Example: `time=2025-01-08T10:30:45.123Z level=WARN msg="stock low" order_id=42`
    #[default]
    Logfmt,

    /// JSON format for machine processing
    ///
    /// Example: `{"time":"2025-01-08T10:30:45.123Z","level":"WARN","msg":"stock low","order_id":42}`
    Json,

    /// Human-readable text format
    ///
    /// Example: `[2025-01-08T10:30:45.123Z] [WARN ] stock low order_id=42`
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logfmt" => Ok(OutputFormat::Logfmt),
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            _ => Err(format!("Invalid output format: '{}'", s)),
        }
    }
}

/// Encoder configuration shared by every line-producing handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineFormat {
    pub output: OutputFormat,
    pub timestamp: TimestampFormat,
}

impl LineFormat {
    pub fn new(output: OutputFormat) -> Self {
        Self {
            output,
            timestamp: TimestampFormat::default(),
        }
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp = format;
        self
    }

    /// Encode `record` with its resolved attributes, without trailing newline
    pub fn encode(&self, record: &LogRecord, attrs: &[(String, FieldValue)]) -> String {
        match self.output {
            OutputFormat::Logfmt => self.format_logfmt(record, attrs),
            OutputFormat::Json => self.format_json(record, attrs),
            OutputFormat::Text => self.format_text(record, attrs, false),
        }
    }

    /// Encode for a terminal; only the text format is colored
    pub fn encode_colored(&self, record: &LogRecord, attrs: &[(String, FieldValue)]) -> String {
        match self.output {
            OutputFormat::Text => self.format_text(record, attrs, true),
            _ => self.encode(record, attrs),
        }
    }

    fn format_logfmt(&self, record: &LogRecord, attrs: &[(String, FieldValue)]) -> String {
        let mut parts = Vec::with_capacity(3 + attrs.len());

        parts.push(format!(
            "time={}",
            escape_logfmt_value(&self.timestamp.format(&record.timestamp()))
        ));
        parts.push(format!("level={}", record.level().to_str()));
        // Message is always quoted
        parts.push(format!("msg={}", quote_logfmt_value(record.message())));

        for (key, value) in flatten(attrs) {
            parts.push(format!("{}={}", escape_logfmt_key(&key), logfmt_value(&value)));
        }

        parts.join(" ")
    }

    fn format_json(&self, record: &LogRecord, attrs: &[(String, FieldValue)]) -> String {
        let mut json_obj = serde_json::Map::new();

        let time = if self.timestamp.is_numeric() {
            serde_json::Value::Number(record.timestamp_nanos().into())
        } else {
            serde_json::Value::String(self.timestamp.format(&record.timestamp()))
        };
        json_obj.insert("time".to_string(), time);
        json_obj.insert(
            "level".to_string(),
            serde_json::Value::String(record.level().to_str().to_string()),
        );
        json_obj.insert(
            "msg".to_string(),
            serde_json::Value::String(record.message().to_string()),
        );

        for (key, value) in attrs {
            json_obj.insert(key.clone(), value.to_json_value());
        }

        serde_json::Value::Object(json_obj).to_string()
    }

    fn format_text(&self, record: &LogRecord, attrs: &[(String, FieldValue)], colored: bool) -> String {
        let level_str = level_label(record.level(), colored);
        let base = format!(
            "[{}] [{}] {}",
            self.timestamp.format(&record.timestamp()),
            level_str,
            record.message()
        );

        if attrs.is_empty() {
            return base;
        }

        let fields = flatten(attrs)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, logfmt_value(&v)))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", base, fields)
    }
}

#[cfg(feature = "console")]
fn level_label(level: LogLevel, colored: bool) -> String {
    use colored::Colorize;
    let padded = format!("{:5}", level.to_str());
    if colored {
        padded.color(level.color_code()).to_string()
    } else {
        padded
    }
}

#[cfg(not(feature = "console"))]
fn level_label(level: LogLevel, _colored: bool) -> String {
    format!("{:5}", level.to_str())
}

/// Expand nested maps into dotted keys
pub fn flatten(attrs: &[(String, FieldValue)]) -> Vec<(String, FieldValue)> {
    let mut out = Vec::with_capacity(attrs.len());
    for (key, value) in attrs {
        value.flatten_into(key, &mut out);
    }
    out
}

fn logfmt_value(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => escape_logfmt_value(s),
        other => escape_logfmt_value(&other.to_string()),
    }
}

/// Escape a logfmt key (drop spaces and special chars, keep group dots)
fn escape_logfmt_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

/// Escape a logfmt value (quote if empty or contains spaces, quotes or `=`)
fn escape_logfmt_value(value: &str) -> String {
    if value.is_empty()
        || value.contains(' ')
        || value.contains('"')
        || value.contains('=')
        || value.contains('\n')
        || value.contains('\r')
    {
        quote_logfmt_value(value)
    } else {
        value.to_string()
    }
}

/// Quote a logfmt value
fn quote_logfmt_value(value: &str) -> String {
    format!(
        "\"{}\"",
        value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
    )
}
