//! Logging configuration read from the environment
//!
//! [`LoggingConfig::from_env`] reads every variable once at startup. Each
//! backend section is `None` when its selecting variable is unset, and an
//! [`InvalidSetting`] when one of its values does not parse, so a bad value
//! only disqualifies the backend it belongs to. Shared settings (`LOG_LEVEL`,
//! `LOG_FORMAT`) that do not parse fall back to their defaults and are listed
//! in [`LoggingConfig::rejected`].

use crate::core::{LogLevel, OutputFormat, SetupError};
use crate::handlers::dispatch::MAX_DISPATCH_LIMIT;
use crate::handlers::{
    DispatchConfig, MetricsPushConfig, RotationPolicy, SyslogConfig, SyslogNetwork,
    TelemetryPushConfig,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Service identity: OTLP `service.name`, Loki `service` label, syslog tag.
pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";

/// Minimum level: `debug`, `info`, `warn` or `error`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Line format of the baseline sink: `logfmt`, `json` or `text`.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// OTLP/HTTP collector endpoint, e.g. `http://otel-collector:4318`.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// OTLP request headers as `key1=value1,key2=value2`.
pub const OTLP_HEADERS_ENV: &str = "OTEL_EXPORTER_OTLP_HEADERS";

/// Loki base URL, e.g. `http://loki:3100`.
pub const LOKI_URL_ENV: &str = "LOKI_URL";

/// Extra static Loki labels as `key1=value1,key2=value2`.
pub const LOKI_LABELS_ENV: &str = "LOKI_LABELS";

/// Syslog `host:port`, or `local` for the local daemon.
pub const SYSLOG_ADDRESS_ENV: &str = "SYSLOG_ADDRESS";

/// Syslog network: `udp` (default) or `tcp`.
pub const SYSLOG_NETWORK_ENV: &str = "SYSLOG_NETWORK";

pub const LOG_FILE_PATH_ENV: &str = "LOG_FILE_PATH";
pub const LOG_FILE_MAX_SIZE_MB_ENV: &str = "LOG_FILE_MAX_SIZE_MB";
pub const LOG_FILE_MAX_BACKUPS_ENV: &str = "LOG_FILE_MAX_BACKUPS";
pub const LOG_FILE_MAX_AGE_DAYS_ENV: &str = "LOG_FILE_MAX_AGE_DAYS";
pub const LOG_FILE_COMPRESS_ENV: &str = "LOG_FILE_COMPRESS";

/// Payloads a push handler buffers before dropping new ones.
pub const LOG_DISPATCH_QUEUE_ENV: &str = "LOG_DISPATCH_QUEUE";

/// Concurrent pushes per handler; `0` means unbounded.
pub const LOG_DISPATCH_MAX_IN_FLIGHT_ENV: &str = "LOG_DISPATCH_MAX_IN_FLIGHT";

/// Per-request push timeout in milliseconds.
pub const LOG_PUSH_TIMEOUT_MS_ENV: &str = "LOG_PUSH_TIMEOUT_MS";

pub const DEFAULT_SERVICE_NAME: &str = "app";

/// A configuration value that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value '{value}' for {variable}: {reason}")]
pub struct InvalidSetting {
    pub variable: String,
    pub value: String,
    pub reason: String,
}

impl InvalidSetting {
    pub fn new(variable: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<InvalidSetting> for SetupError {
    fn from(err: InvalidSetting) -> Self {
        SetupError::config(err.variable.clone(), err.to_string())
    }
}

/// A backend section: absent, parsed, or rejected
pub type BackendSetting<T> = Option<Result<T, InvalidSetting>>;

/// Rotating file backend settings
#[derive(Debug, Clone, PartialEq)]
pub struct FileConfig {
    pub path: PathBuf,
    pub policy: RotationPolicy,
    /// Also write every line to stdout
    pub tee_stdout: bool,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: RotationPolicy::default(),
            tee_stdout: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub service_name: String,
    pub level: LogLevel,
    pub format: OutputFormat,
    pub telemetry: BackendSetting<TelemetryPushConfig>,
    pub metrics_push: BackendSetting<MetricsPushConfig>,
    pub syslog: BackendSetting<SyslogConfig>,
    pub file: BackendSetting<FileConfig>,
    /// Shared settings that did not parse and were replaced by defaults
    pub rejected: Vec<InvalidSetting>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            level: LogLevel::Info,
            format: OutputFormat::Logfmt,
            telemetry: None,
            metrics_push: None,
            syslog: None,
            file: None,
            rejected: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Read the process environment
    ///
    /// Never fails: backend-specific problems are kept in that backend's
    /// section, and unparseable shared settings fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let service_name = get(SERVICE_NAME_ENV).unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let mut rejected = Vec::new();
        let level = parse_with(&get, LOG_LEVEL_ENV, LogLevel::Info, |v| v.parse::<LogLevel>())
            .unwrap_or_else(|invalid| {
                rejected.push(invalid);
                LogLevel::Info
            });
        let format = parse_with(&get, LOG_FORMAT_ENV, OutputFormat::Logfmt, |v| v.parse::<OutputFormat>())
            .unwrap_or_else(|invalid| {
                rejected.push(invalid);
                OutputFormat::Logfmt
            });
        let dispatch = dispatch_config(&get);

        let telemetry = get(OTLP_ENDPOINT_ENV).map(|endpoint| -> Result<_, InvalidSetting> {
            let headers = get(OTLP_HEADERS_ENV)
                .map(|raw| parse_pairs(OTLP_HEADERS_ENV, &raw))
                .transpose()?
                .unwrap_or_default();
            Ok(TelemetryPushConfig::new(endpoint, service_name.clone())
                .with_headers(headers)
                .with_dispatch(dispatch.clone()?))
        });

        let metrics_push = get(LOKI_URL_ENV).map(|url| -> Result<_, InvalidSetting> {
            let mut config = MetricsPushConfig::new(url, service_name.clone()).with_dispatch(dispatch.clone()?);
            if let Some(raw) = get(LOKI_LABELS_ENV) {
                config.labels.extend(parse_pairs(LOKI_LABELS_ENV, &raw)?);
            }
            Ok(config)
        });

        let syslog = get(SYSLOG_ADDRESS_ENV).map(|address| -> Result<_, InvalidSetting> {
            let config = if address.eq_ignore_ascii_case("local") {
                SyslogConfig::local()
            } else {
                let network = match get(SYSLOG_NETWORK_ENV) {
                    None => SyslogNetwork::Udp,
                    Some(raw) => raw
                        .parse::<SyslogNetwork>()
                        .map_err(|e| InvalidSetting::new(SYSLOG_NETWORK_ENV, &raw, e.to_string()))?,
                };
                SyslogConfig::new(network, address)
            };
            Ok(config.with_tag(service_name.clone()))
        });

        let file = get(LOG_FILE_PATH_ENV).map(|path| -> Result<_, InvalidSetting> {
            let defaults = RotationPolicy::default();
            let max_mb = parse_with(&get, LOG_FILE_MAX_SIZE_MB_ENV, 100u64, parse_number)?;
            let max_backups = parse_with(&get, LOG_FILE_MAX_BACKUPS_ENV, defaults.max_backups, parse_number)?;
            let max_age_days = parse_with(&get, LOG_FILE_MAX_AGE_DAYS_ENV, 30u64, parse_number)?;
            let compress = parse_with(&get, LOG_FILE_COMPRESS_ENV, defaults.compress, parse_bool)?;

            // Zero disables the size or age limit
            let policy = RotationPolicy {
                max_bytes: (max_mb > 0).then(|| max_mb.saturating_mul(1024 * 1024)),
                max_backups,
                max_age: (max_age_days > 0).then(|| Duration::from_secs(max_age_days.saturating_mul(86_400))),
                compress,
            };
            Ok(FileConfig {
                policy,
                ..FileConfig::new(path)
            })
        });

        Self {
            service_name,
            level,
            format,
            telemetry,
            metrics_push,
            syslog,
            file,
            rejected,
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_telemetry(mut self, config: TelemetryPushConfig) -> Self {
        self.telemetry = Some(Ok(config));
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_metrics_push(mut self, config: MetricsPushConfig) -> Self {
        self.metrics_push = Some(Ok(config));
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_syslog(mut self, config: SyslogConfig) -> Self {
        self.syslog = Some(Ok(config));
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_file(mut self, config: FileConfig) -> Self {
        self.file = Some(Ok(config));
        self
    }
}

fn parse_with<G, T, E, P>(get: &G, key: &str, default: T, parse: P) -> Result<T, InvalidSetting>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, E>,
    E: ToString,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => parse(&raw).map_err(|e| InvalidSetting::new(key, &raw, e.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| "expected a non-negative integer".to_string())
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

fn dispatch_config<G>(get: &G) -> Result<DispatchConfig, InvalidSetting>
where
    G: Fn(&str) -> Option<String>,
{
    let defaults = DispatchConfig::default();
    let queue_capacity = parse_with(get, LOG_DISPATCH_QUEUE_ENV, defaults.queue_capacity, parse_number)?;
    let max_in_flight = parse_with(get, LOG_DISPATCH_MAX_IN_FLIGHT_ENV, 32usize, parse_number)?;
    let timeout_ms = parse_with(get, LOG_PUSH_TIMEOUT_MS_ENV, 5_000u64, parse_number)?;

    if queue_capacity == 0 || queue_capacity > MAX_DISPATCH_LIMIT {
        return Err(InvalidSetting::new(
            LOG_DISPATCH_QUEUE_ENV,
            &queue_capacity.to_string(),
            format!("queue capacity must be between 1 and {}", MAX_DISPATCH_LIMIT),
        ));
    }
    if max_in_flight > MAX_DISPATCH_LIMIT {
        return Err(InvalidSetting::new(
            LOG_DISPATCH_MAX_IN_FLIGHT_ENV,
            &max_in_flight.to_string(),
            format!("at most {} requests can be in flight", MAX_DISPATCH_LIMIT),
        ));
    }
    if timeout_ms == 0 {
        return Err(InvalidSetting::new(LOG_PUSH_TIMEOUT_MS_ENV, "0", "timeout must be positive"));
    }
    Ok(DispatchConfig {
        queue_capacity,
        max_in_flight: (max_in_flight > 0).then_some(max_in_flight),
        request_timeout: Duration::from_millis(timeout_ms),
    })
}

/// Parse `k1=v1,k2=v2` into a map
///
/// Whitespace around keys and values is trimmed and empty items are
/// skipped. An item without `=` or with an empty key is rejected.
pub fn parse_pairs(variable: &str, raw: &str) -> Result<BTreeMap<String, String>, InvalidSetting> {
    let mut pairs = BTreeMap::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| InvalidSetting::new(variable, item, "expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(InvalidSetting::new(variable, item, "empty key"));
        }
        pairs.insert(key.to_string(), value.trim().to_string());
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment() {
        let config = LoggingConfig::from_lookup(lookup(&[]));
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_all_backends_present() {
        let config = LoggingConfig::from_lookup(lookup(&[
            (SERVICE_NAME_ENV, "orders"),
            (LOG_LEVEL_ENV, "debug"),
            (OTLP_ENDPOINT_ENV, "collector:4318"),
            (OTLP_HEADERS_ENV, "api-key=secret, x-tenant = acme"),
            (LOKI_URL_ENV, "http://loki:3100"),
            (LOKI_LABELS_ENV, "env=prod"),
            (SYSLOG_ADDRESS_ENV, "syslog:514"),
            (LOG_FILE_PATH_ENV, "/var/log/orders.log"),
        ]));

        assert_eq!(config.level, LogLevel::Debug);

        let telemetry = config.telemetry.unwrap().unwrap();
        assert_eq!(telemetry.service_name, "orders");
        assert_eq!(telemetry.headers.get("api-key").map(String::as_str), Some("secret"));
        assert_eq!(telemetry.headers.get("x-tenant").map(String::as_str), Some("acme"));

        let loki = config.metrics_push.unwrap().unwrap();
        assert_eq!(loki.labels.get("service").map(String::as_str), Some("orders"));
        assert_eq!(loki.labels.get("env").map(String::as_str), Some("prod"));

        let syslog = config.syslog.unwrap().unwrap();
        assert_eq!(syslog.network, SyslogNetwork::Udp);
        assert_eq!(syslog.tag, "orders");

        let file = config.file.unwrap().unwrap();
        assert_eq!(file.policy, RotationPolicy::default());
    }

    #[test]
    fn test_local_syslog_address() {
        let config = LoggingConfig::from_lookup(lookup(&[(SYSLOG_ADDRESS_ENV, "local")]));
        let syslog = config.syslog.unwrap().unwrap();
        assert_eq!(syslog.network, SyslogNetwork::Local);
        assert!(syslog.address.is_none());
    }

    #[test]
    fn test_malformed_value_only_disqualifies_its_backend() {
        let config = LoggingConfig::from_lookup(lookup(&[
            (LOG_FILE_PATH_ENV, "/tmp/app.log"),
            (LOG_FILE_MAX_BACKUPS_ENV, "many"),
            (SYSLOG_ADDRESS_ENV, "127.0.0.1:514"),
        ]));

        let err = config.file.unwrap().unwrap_err();
        assert_eq!(err.variable, LOG_FILE_MAX_BACKUPS_ENV);
        assert!(config.syslog.unwrap().is_ok());
    }

    #[test]
    fn test_dispatch_settings() {
        let config = LoggingConfig::from_lookup(lookup(&[
            (OTLP_ENDPOINT_ENV, "collector:4318"),
            (LOG_DISPATCH_MAX_IN_FLIGHT_ENV, "0"),
            (LOG_PUSH_TIMEOUT_MS_ENV, "250"),
        ]));

        let dispatch = config.telemetry.unwrap().unwrap().dispatch;
        assert_eq!(dispatch.max_in_flight, None);
        assert_eq!(dispatch.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_level_keeps_backends() {
        let config = LoggingConfig::from_lookup(lookup(&[
            (LOG_LEVEL_ENV, "verbose"),
            (LOG_FORMAT_ENV, "xml"),
            (SYSLOG_ADDRESS_ENV, "127.0.0.1:514"),
        ]));

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, OutputFormat::Logfmt);
        assert_eq!(config.rejected.len(), 2);
        assert_eq!(config.rejected[0].variable, LOG_LEVEL_ENV);
        assert_eq!(config.rejected[1].variable, LOG_FORMAT_ENV);
        assert!(config.syslog.unwrap().is_ok());
    }

    #[test]
    fn test_dispatch_limits_rejected() {
        let huge = usize::MAX.to_string();
        for variable in [LOG_DISPATCH_QUEUE_ENV, LOG_DISPATCH_MAX_IN_FLIGHT_ENV] {
            let config = LoggingConfig::from_lookup(lookup(&[
                (OTLP_ENDPOINT_ENV, "collector:4318"),
                (LOKI_URL_ENV, "http://loki:3100"),
                (variable, huge.as_str()),
            ]));
            assert_eq!(config.telemetry.unwrap().unwrap_err().variable, variable);
            assert_eq!(config.metrics_push.unwrap().unwrap_err().variable, variable);
        }

        let config = LoggingConfig::from_lookup(lookup(&[
            (OTLP_ENDPOINT_ENV, "collector:4318"),
            (LOG_PUSH_TIMEOUT_MS_ENV, "0"),
        ]));
        assert_eq!(
            config.telemetry.unwrap().unwrap_err().variable,
            LOG_PUSH_TIMEOUT_MS_ENV
        );
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("X", "a=1,,b = two=2 ").unwrap();
        assert_eq!(pairs.get("a").map(String::as_str), Some("1"));
        assert_eq!(pairs.get("b").map(String::as_str), Some("two=2"));

        assert!(parse_pairs("X", "novalue").is_err());
        assert!(parse_pairs("X", "=v").is_err());
    }

    #[test]
    fn test_invalid_setting_converts_to_setup_error() {
        let err: SetupError = InvalidSetting::new(LOKI_LABELS_ENV, "x", "expected key=value").into();
        assert!(matches!(err, SetupError::InvalidConfiguration { .. }));
    }
}
