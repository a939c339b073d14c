//! Log record and handler scope
//!
//! A [`LogRecord`] is one emission: built once, then only read. Handlers
//! carry a [`HandlerScope`] holding the attributes and group prefix they
//! were derived with; deriving a handler produces a new scope and never
//! touches records that were already emitted.

use super::log_level::LogLevel;
use super::value::{Attribute, FieldValue};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    message: String,
    attributes: Vec<Attribute>,
    groups: Vec<String>,
}

impl LogRecord {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// so a record always encodes to exactly one line.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(level: LogLevel, message: impl AsRef<str>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: Self::sanitize_message(message.as_ref()),
            attributes: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Override the capture time
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    #[must_use]
    pub fn with_attributes<I>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = Attribute>,
    {
        self.attributes.extend(attrs);
        self
    }

    /// Nest this record's own attributes under `name`
    #[must_use]
    pub fn in_group(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.groups.push(name);
        }
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Unix time in nanoseconds
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.timestamp.timestamp_micros().saturating_mul(1_000))
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Record attributes with the record's own group prefix applied
    pub fn prefixed_attributes(&self, scope_prefix: &str) -> Vec<(String, FieldValue)> {
        let mut prefix = scope_prefix.to_string();
        for group in &self.groups {
            prefix.push_str(group);
            prefix.push('.');
        }
        self.attributes
            .iter()
            .map(|a| (format!("{}{}", prefix, a.key), a.value.clone()))
            .collect()
    }
}

/// Attribute and group state carried by a handler
///
/// Cloning is cheap: attributes are shared until a derived scope extends them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerScope {
    attributes: Arc<Vec<(String, FieldValue)>>,
    prefix: String,
}

impl HandlerScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a scope that additionally carries `extra`, keyed under the current group
    #[must_use]
    pub fn with_attributes(&self, extra: &[Attribute]) -> Self {
        if extra.is_empty() {
            return self.clone();
        }
        let mut attributes = Vec::with_capacity(self.attributes.len() + extra.len());
        attributes.extend(self.attributes.iter().cloned());
        attributes.extend(
            extra
                .iter()
                .map(|a| (format!("{}{}", self.prefix, a.key), a.value.clone())),
        );
        Self {
            attributes: Arc::new(attributes),
            prefix: self.prefix.clone(),
        }
    }

    /// Derive a scope whose later attributes are keyed under `name.`
    #[must_use]
    pub fn with_group(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }
        Self {
            attributes: Arc::clone(&self.attributes),
            prefix: format!("{}{}.", self.prefix, name),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn attributes(&self) -> &[(String, FieldValue)] {
        &self.attributes
    }

    /// All attributes of `record` as seen through this scope, scope attributes first
    pub fn resolve(&self, record: &LogRecord) -> Vec<(String, FieldValue)> {
        let mut resolved = Vec::with_capacity(self.attributes.len() + record.attributes().len());
        resolved.extend(self.attributes.iter().cloned());
        resolved.extend(record.prefixed_attributes(&self.prefix));
        resolved
    }
}
