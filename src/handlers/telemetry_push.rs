//! Telemetry-push handler for OTLP/HTTP JSON logs
//!
//! Records go to the baseline sink first. Each one is then exported as its
//! own `ExportLogsServiceRequest` with a single resource, scope and log
//! record, POSTed to `<endpoint>/v1/logs` by the handler's dispatcher.

use super::baseline::BaselineSink;
use super::dispatch::{
    check_reachable, join_path, parse_endpoint, DispatchConfig, Dispatcher,
    DEFAULT_REACHABILITY_TIMEOUT,
};
use crate::core::format::flatten;
use crate::core::{
    otlp_severity_number, Attribute, CloseError, DispatchMetrics, Handler, LogLevel, LogRecord,
    SetupError, SharedHandler,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const LOGS_PATH: &str = "/v1/logs";

/// Instrumentation scope reported with every export
pub const SCOPE_NAME: &str = "log_fabric";
pub const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPushConfig {
    /// Collector base URL; `http://` is assumed when no scheme is given
    pub endpoint: String,
    pub service_name: String,
    pub headers: BTreeMap<String, String>,
    pub verify_on_setup: bool,
    pub reachability_timeout: Duration,
    pub dispatch: DispatchConfig,
}

impl TelemetryPushConfig {
    pub fn new(endpoint: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            service_name: service_name.into(),
            headers: BTreeMap::new(),
            verify_on_setup: true,
            reachability_timeout: DEFAULT_REACHABILITY_TIMEOUT,
            dispatch: DispatchConfig::default(),
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
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

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportLogsRequest<'a> {
    resource_logs: [ResourceLogs<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLogs<'a> {
    resource: Resource<'a>,
    scope_logs: [ScopeLogs<'a>; 1],
}

#[derive(Serialize)]
struct Resource<'a> {
    attributes: [KeyValue<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeLogs<'a> {
    scope: Scope,
    log_records: [OtlpLogRecord<'a>; 1],
}

#[derive(Serialize)]
struct Scope {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpLogRecord<'a> {
    time_unix_nano: String,
    severity_number: i32,
    severity_text: &'static str,
    body: AnyValue<'a>,
    attributes: Vec<KeyValue<'a>>,
}

#[derive(Serialize)]
struct KeyValue<'a> {
    key: std::borrow::Cow<'a, str>,
    value: AnyValue<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnyValue<'a> {
    string_value: std::borrow::Cow<'a, str>,
}

#[derive(Clone)]
pub struct TelemetryPushHandler {
    baseline: BaselineSink,
    service_name: Arc<str>,
    dispatcher: Arc<Dispatcher>,
}

impl TelemetryPushHandler {
    /// Create the handler and start its dispatcher
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidConfiguration`] for a malformed endpoint
    /// or header, [`SetupError::Unreachable`] when the reachability check fails, and
    /// [`SetupError::Runtime`] if the dispatcher cannot start.
    pub fn new(config: TelemetryPushConfig, baseline: BaselineSink) -> Result<Self, SetupError> {
        let base = parse_endpoint("otlp", &config.endpoint)?;
        if config.verify_on_setup {
            check_reachable(&base, config.reachability_timeout)?;
        }
        let dispatcher = Dispatcher::start("otlp", join_path(&base, LOGS_PATH), &config.headers, &config.dispatch)?;

        Ok(Self {
            baseline,
            service_name: Arc::from(config.service_name),
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn dispatch_metrics(&self) -> &DispatchMetrics {
        self.dispatcher.metrics()
    }

    /// Wait for queued exports to finish
    pub fn flush(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    fn payload(&self, record: &LogRecord) -> serde_json::Result<Vec<u8>> {
        let attributes = flatten(&self.baseline.resolve(record))
            .into_iter()
            .map(|(key, value)| KeyValue {
                key: key.into(),
                value: AnyValue {
                    string_value: value.to_string().into(),
                },
            })
            .collect();

        let request = ExportLogsRequest {
            resource_logs: [ResourceLogs {
                resource: Resource {
                    attributes: [KeyValue {
                        key: "service.name".into(),
                        value: AnyValue {
                            string_value: (&*self.service_name).into(),
                        },
                    }],
                },
                scope_logs: [ScopeLogs {
                    scope: Scope {
                        name: SCOPE_NAME,
                        version: SCOPE_VERSION,
                    },
                    log_records: [OtlpLogRecord {
                        time_unix_nano: record.timestamp_nanos().to_string(),
                        severity_number: otlp_severity_number(record.level()),
                        severity_text: record.level().to_str(),
                        body: AnyValue {
                            string_value: record.message().into(),
                        },
                        attributes,
                    }],
                }],
            }],
        };
        serde_json::to_vec(&request)
    }
}

impl Handler for TelemetryPushHandler {
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
            service_name: Arc::clone(&self.service_name),
            dispatcher: Arc::clone(&self.dispatcher),
        })
    }

    fn with_group(&self, name: &str) -> SharedHandler {
        Arc::new(Self {
            baseline: self.baseline.derive_group(name),
            service_name: Arc::clone(&self.service_name),
            dispatcher: Arc::clone(&self.dispatcher),
        })
    }

    fn close(&self) -> Result<(), CloseError> {
        let dispatcher = self.dispatcher.close();
        let baseline = self.baseline.close();
        dispatcher.and(baseline)
    }

    fn name(&self) -> &str {
        "otlp"
    }
}
