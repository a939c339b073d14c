//! Metrics-push handler for the Loki push API
//!
//! Each record is written to the baseline sink, then pushed on its own as a
//! one-entry stream:
//!
//! ```text
//! {"streams":[{"stream":{"job":"log-fabric","service":"orders"},
//!              "values":[["1736332245123456789","{\"time\":...}"]]}]}
//! ```
//!
//! The push runs on the handler's [`Dispatcher`]; its outcome never reaches
//! the caller.

use super::baseline::BaselineSink;
use super::dispatch::{
    check_reachable, join_path, parse_endpoint, DispatchConfig, Dispatcher,
    DEFAULT_REACHABILITY_TIMEOUT,
};
use crate::core::{
    Attribute, CloseError, DispatchMetrics, FieldValue, Handler, LineFormat, LogLevel, LogRecord,
    OutputFormat, SetupError, SharedHandler, TimestampFormat,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Value of the `job` label when none is configured
pub const DEFAULT_JOB: &str = "log-fabric";

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPushConfig {
    /// Base URL; the push path is appended
    pub url: String,
    pub labels: BTreeMap<String, String>,
    /// Extra request headers, e.g. `X-Scope-OrgID` for multi-tenant setups
    pub headers: BTreeMap<String, String>,
    pub verify_on_setup: bool,
    pub reachability_timeout: Duration,
    pub dispatch: DispatchConfig,
}

impl MetricsPushConfig {
    /// Config with the default `service` and `job` labels
    pub fn new(url: impl Into<String>, service: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), service.into());
        labels.insert("job".to_string(), DEFAULT_JOB.to_string());
        Self {
            url: url.into(),
            labels,
            headers: BTreeMap::new(),
            verify_on_setup: true,
            reachability_timeout: DEFAULT_REACHABILITY_TIMEOUT,
            dispatch: DispatchConfig::default(),
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Skip the reachability check at construction
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn without_verification(mut self) -> Self {
        self.verify_on_setup = false;
        self
    }
}

/// Restrict a label name to `[A-Za-z0-9_]`, not starting with a digit
fn sanitize_label_key(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: [Stream<'a>; 1],
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: [[String; 2]; 1],
}

#[derive(Clone)]
pub struct MetricsPushHandler {
    baseline: BaselineSink,
    labels: Arc<BTreeMap<String, String>>,
    line_format: LineFormat,
    dispatcher: Arc<Dispatcher>,
}

impl MetricsPushHandler {
    /// Create the handler and start its dispatcher
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidConfiguration`] for a malformed URL,
    /// [`SetupError::Unreachable`] when the reachability check fails, and
    /// [`SetupError::Runtime`] if the dispatcher cannot start.
    pub fn new(config: MetricsPushConfig, baseline: BaselineSink) -> Result<Self, SetupError> {
        let base = parse_endpoint("loki", &config.url)?;
        if config.verify_on_setup {
            check_reachable(&base, config.reachability_timeout)?;
        }

        let labels = config
            .labels
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (sanitize_label_key(k), v.clone()))
            .collect();
        let dispatcher = Dispatcher::start("loki", join_path(&base, PUSH_PATH), &config.headers, &config.dispatch)?;

        Ok(Self {
            baseline,
            labels: Arc::new(labels),
            line_format: LineFormat::new(OutputFormat::Json)
                .with_timestamp_format(TimestampFormat::Rfc3339Nanos),
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn dispatch_metrics(&self) -> &DispatchMetrics {
        self.dispatcher.metrics()
    }

    /// Wait for queued pushes to finish
    pub fn flush(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    fn payload(&self, record: &LogRecord) -> serde_json::Result<Vec<u8>> {
        let line = self.line_format.encode(record, &self.baseline.resolve(record));
        serde_json::to_vec(&PushRequest {
            streams: [Stream {
                stream: &self.labels,
                values: [[record.timestamp_nanos().to_string(), line]],
            }],
        })
    }

    /// String attributes become labels; everything else stays in the line
    fn derive_labels(&self, extra: &[Attribute]) -> Arc<BTreeMap<String, String>> {
        let prefix = self.baseline.scope().prefix();
        let promoted: Vec<_> = extra
            .iter()
            .filter_map(|a| match &a.value {
                FieldValue::String(s) if !a.key.is_empty() => {
                    Some((sanitize_label_key(&format!("{}{}", prefix, a.key)), s.clone()))
                }
                _ => None,
            })
            .collect();
        if promoted.is_empty() {
            return Arc::clone(&self.labels);
        }
        let mut labels = (*self.labels).clone();
        labels.extend(promoted);
        Arc::new(labels)
    }
}

impl Handler for MetricsPushHandler {
    fn enabled(&self, level: LogLevel) -> bool {
        self.baseline.enabled(level)
    }

    fn emit(&self, record: &LogRecord) -> crate::core::Result<()> {
        let written = self.baseline.emit(record);
        if let Ok(body) = self.payload(record) {
            self.dispatcher.submit(body);
        }
        written
    }

    fn with_attributes(&self, extra: &[Attribute]) -> SharedHandler {
        Arc::new(Self {
            baseline: self.baseline.derive_attributes(extra),
            labels: self.derive_labels(extra),
            line_format: self.line_format,
            dispatcher: Arc::clone(&self.dispatcher),
        })
    }

    fn with_group(&self, name: &str) -> SharedHandler {
        Arc::new(Self {
            baseline: self.baseline.derive_group(name),
            labels: Arc::clone(&self.labels),
            line_format: self.line_format,
            dispatcher: Arc::clone(&self.dispatcher),
        })
    }

    fn close(&self) -> Result<(), CloseError> {
        let dispatcher = self.dispatcher.close();
        let baseline = self.baseline.close();
        dispatcher.and(baseline)
    }

    fn name(&self) -> &str {
        "loki"
    }
}
