//! Backend selection at process start
//!
//! Candidates are tried in a fixed order: telemetry push, metrics push,
//! syslog, rotating file, console. The first one that builds wins. A
//! candidate that fails is logged through the console logger and the next
//! one is tried. Console never fails, so setup always ends with a logger.
//!
//! Handlers know nothing about this order; it lives only in
//! [`PriorityChain`].

use crate::config::{FileConfig, InvalidSetting, LoggingConfig};
use crate::core::{attr, install, LogLevel, Logger, OutputFormat, SetupError, SharedHandler};
use crate::handlers::{
    BaselineSink, MetricsPushConfig, MetricsPushHandler, SyslogConfig, SyslogHandler,
    TelemetryPushConfig, TelemetryPushHandler,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Telemetry,
    MetricsPush,
    Syslog,
    File,
    Console,
}

impl BackendKind {
    /// Highest priority first
    pub const PRIORITY: [BackendKind; 5] = [
        BackendKind::Telemetry,
        BackendKind::MetricsPush,
        BackendKind::Syslog,
        BackendKind::File,
        BackendKind::Console,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Telemetry => "otlp",
            BackendKind::MetricsPush => "loki",
            BackendKind::Syslog => "syslog",
            BackendKind::File => "file",
            BackendKind::Console => "console",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for one configured backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCandidate {
    Telemetry(TelemetryPushConfig),
    MetricsPush(MetricsPushConfig),
    Syslog(SyslogConfig),
    File(FileConfig),
}

impl BackendCandidate {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendCandidate::Telemetry(_) => BackendKind::Telemetry,
            BackendCandidate::MetricsPush(_) => BackendKind::MetricsPush,
            BackendCandidate::Syslog(_) => BackendKind::Syslog,
            BackendCandidate::File(_) => BackendKind::File,
        }
    }
}

/// One slot of the chain; configuration that failed to parse still takes
/// its place so the failure is reported in order
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    pub kind: BackendKind,
    pub candidate: Result<BackendCandidate, InvalidSetting>,
}

/// Configured backends in priority order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityChain {
    entries: Vec<ChainEntry>,
}

impl PriorityChain {
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut entries = Vec::new();
        let mut push = |kind, setting: Option<Result<BackendCandidate, InvalidSetting>>| {
            if let Some(candidate) = setting {
                entries.push(ChainEntry { kind, candidate });
            }
        };

        push(
            BackendKind::Telemetry,
            config.telemetry.clone().map(|r| r.map(BackendCandidate::Telemetry)),
        );
        push(
            BackendKind::MetricsPush,
            config.metrics_push.clone().map(|r| r.map(BackendCandidate::MetricsPush)),
        );
        push(
            BackendKind::Syslog,
            config.syslog.clone().map(|r| r.map(BackendCandidate::Syslog)),
        );
        push(
            BackendKind::File,
            config.file.clone().map(|r| r.map(BackendCandidate::File)),
        );

        Self { entries }
    }

    /// Build a chain from candidates given in any order
    pub fn from_candidates<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = BackendCandidate>,
    {
        let mut entries: Vec<ChainEntry> = candidates
            .into_iter()
            .map(|candidate| ChainEntry {
                kind: candidate.kind(),
                candidate: Ok(candidate),
            })
            .collect();
        // Stable: candidates of the same kind keep their given order
        entries.sort_by_key(|entry| entry.kind);
        Self { entries }
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Constructs handlers for chain candidates
pub trait HandlerFactory {
    /// Build the handler for `candidate`, or report why it cannot be used
    fn build(&self, candidate: &BackendCandidate) -> Result<SharedHandler, SetupError>;

    /// The terminal fallback; must not fail
    fn console(&self) -> SharedHandler;
}

/// Builds the crate's handlers, each embedding a stdout baseline
#[derive(Clone)]
pub struct DefaultHandlerFactory {
    level: LogLevel,
    format: OutputFormat,
    baseline: Option<BaselineSink>,
}

impl DefaultHandlerFactory {
    pub fn new(level: LogLevel, format: OutputFormat) -> Self {
        Self {
            level,
            format,
            baseline: None,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(config.level, config.format)
    }

    /// Use `sink` instead of stdout as console and embedded baseline
    ///
    /// The sink's own level and format apply. File candidates still open
    /// their file.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_baseline(mut self, sink: BaselineSink) -> Self {
        self.baseline = Some(sink);
        self
    }

    fn baseline(&self) -> BaselineSink {
        match &self.baseline {
            Some(sink) => sink.clone(),
            None => BaselineSink::stdout(self.level).with_output_format(self.format),
        }
    }
}

impl HandlerFactory for DefaultHandlerFactory {
    fn build(&self, candidate: &BackendCandidate) -> Result<SharedHandler, SetupError> {
        let handler: SharedHandler = match candidate {
            BackendCandidate::Telemetry(config) => {
                Arc::new(TelemetryPushHandler::new(config.clone(), self.baseline())?)
            }
            BackendCandidate::MetricsPush(config) => {
                Arc::new(MetricsPushHandler::new(config.clone(), self.baseline())?)
            }
            BackendCandidate::Syslog(config) => {
                Arc::new(SyslogHandler::connect(config.clone(), self.baseline())?)
            }
            BackendCandidate::File(config) => {
                let sink = if config.tee_stdout {
                    BaselineSink::file_and_stdout(&config.path, config.policy.clone(), self.level)?
                } else {
                    BaselineSink::file(&config.path, config.policy.clone(), self.level)?
                };
                Arc::new(sink.with_output_format(self.format))
            }
        };
        Ok(handler)
    }

    fn console(&self) -> SharedHandler {
        Arc::new(self.baseline())
    }
}

#[derive(Debug)]
pub struct SetupFailure {
    pub kind: BackendKind,
    pub error: SetupError,
}

/// Result of running the chain
#[derive(Debug)]
pub struct SetupOutcome {
    pub logger: Logger,
    pub selected: BackendKind,
    /// Candidates that were tried and failed, in the order tried
    pub failures: Vec<SetupFailure>,
}

/// Try `chain` in order with `factory`; the first success is selected
pub fn setup_with<F>(chain: &PriorityChain, factory: &F) -> SetupOutcome
where
    F: HandlerFactory + ?Sized,
{
    let console = Logger::new(factory.console());
    let mut failures = Vec::new();

    for entry in chain.entries() {
        let built = match &entry.candidate {
            Ok(candidate) => factory.build(candidate),
            Err(invalid) => Err(SetupError::from(invalid.clone())),
        };

        match built {
            Ok(handler) => {
                let logger = Logger::new(handler);
                logger.info_with("Logging backend selected", &[attr("backend", entry.kind.as_str())]);
                return SetupOutcome {
                    logger,
                    selected: entry.kind,
                    failures,
                };
            }
            Err(error) => {
                console.warn_with(
                    "Logging backend unavailable, trying next option",
                    &[
                        attr("backend", entry.kind.as_str()),
                        attr("error", error.to_string()),
                    ],
                );
                failures.push(SetupFailure {
                    kind: entry.kind,
                    error,
                });
            }
        }
    }

    console.info_with("Logging backend selected", &[attr("backend", BackendKind::Console.as_str())]);
    SetupOutcome {
        logger: console,
        selected: BackendKind::Console,
        failures,
    }
}

/// Run the chain described by `config` with the default handlers
///
/// Shared settings that fell back to defaults are reported through the
/// selected logger.
pub fn setup(config: &LoggingConfig) -> SetupOutcome {
    let outcome = setup_with(
        &PriorityChain::from_config(config),
        &DefaultHandlerFactory::from_config(config),
    );
    for invalid in &config.rejected {
        outcome.logger.warn_with(
            "Invalid logging setting, using default",
            &[
                attr("variable", invalid.variable.as_str()),
                attr("error", invalid.to_string()),
            ],
        );
    }
    outcome
}

/// Read the environment, run the chain and install the result process-wide
///
/// If a logger was installed earlier, that one stays and the newly built
/// one is closed.
pub fn init_from_env() -> &'static Logger {
    let config = LoggingConfig::from_env();

    match install(setup(&config).logger) {
        Ok(logger) => logger,
        Err(rejected) => {
            eprintln!("[WARN] A logger is already installed; keeping it");
            if let Err(e) = rejected.close() {
                eprintln!("[WARN] Failed to close unused logger: {}", e);
            }
            crate::core::global()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{SharedBuffer, SyslogNetwork};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::path::PathBuf;

    struct MockFactory {
        succeeds: HashSet<BackendKind>,
        attempts: Mutex<Vec<BackendKind>>,
        console: SharedBuffer,
        selected: SharedBuffer,
    }

    impl MockFactory {
        fn new(succeeds: &[BackendKind]) -> Self {
            Self {
                succeeds: succeeds.iter().copied().collect(),
                attempts: Mutex::new(Vec::new()),
                console: SharedBuffer::new(),
                selected: SharedBuffer::new(),
            }
        }

        fn attempts(&self) -> Vec<BackendKind> {
            self.attempts.lock().clone()
        }
    }

    impl HandlerFactory for MockFactory {
        fn build(&self, candidate: &BackendCandidate) -> Result<SharedHandler, SetupError> {
            let kind = candidate.kind();
            self.attempts.lock().push(kind);
            if self.succeeds.contains(&kind) {
                Ok(Arc::new(BaselineSink::from_writer(
                    kind.as_str(),
                    self.selected.clone(),
                    LogLevel::Info,
                )))
            } else {
                Err(SetupError::unreachable(kind.as_str(), "mock failure"))
            }
        }

        fn console(&self) -> SharedHandler {
            Arc::new(BaselineSink::from_writer("console", self.console.clone(), LogLevel::Info))
        }
    }

    fn all_candidates() -> Vec<BackendCandidate> {
        vec![
            BackendCandidate::File(FileConfig::new("/tmp/app.log")),
            BackendCandidate::Syslog(SyslogConfig::new(SyslogNetwork::Udp, "127.0.0.1:514")),
            BackendCandidate::MetricsPush(MetricsPushConfig::new("http://loki:3100", "app")),
            BackendCandidate::Telemetry(TelemetryPushConfig::new("collector:4318", "app")),
        ]
    }

    #[test]
    fn test_chain_orders_by_priority() {
        let chain = PriorityChain::from_candidates(all_candidates());
        let kinds: Vec<_> = chain.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BackendKind::Telemetry,
                BackendKind::MetricsPush,
                BackendKind::Syslog,
                BackendKind::File,
            ]
        );
    }

    #[test]
    fn test_first_success_wins() {
        let factory = MockFactory::new(&[BackendKind::MetricsPush, BackendKind::File]);
        let outcome = setup_with(&PriorityChain::from_candidates(all_candidates()), &factory);

        assert_eq!(outcome.selected, BackendKind::MetricsPush);
        // Nothing below the winner is attempted
        assert_eq!(factory.attempts(), vec![BackendKind::Telemetry, BackendKind::MetricsPush]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, BackendKind::Telemetry);
    }

    #[test]
    fn test_all_failing_falls_back_to_console() {
        let factory = MockFactory::new(&[]);
        let outcome = setup_with(&PriorityChain::from_candidates(all_candidates()), &factory);

        assert_eq!(outcome.selected, BackendKind::Console);
        assert_eq!(factory.attempts().len(), 4);
        assert_eq!(outcome.failures.len(), 4);

        // Each failure was logged through the console handler
        let console = factory.console.lines();
        assert_eq!(
            console.iter().filter(|l| l.contains("level=WARN")).count(),
            4
        );
        assert!(console[0].contains("backend=otlp"));
        assert!(console[3].contains("backend=file"));
    }

    #[test]
    fn test_empty_chain_selects_console() {
        let factory = MockFactory::new(&[BackendKind::Telemetry]);
        let outcome = setup_with(&PriorityChain::default(), &factory);

        assert_eq!(outcome.selected, BackendKind::Console);
        assert!(factory.attempts().is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_selected_logger_is_used() {
        let factory = MockFactory::new(&[BackendKind::Syslog]);
        let outcome = setup_with(&PriorityChain::from_candidates(all_candidates()), &factory);

        outcome.logger.warn("after setup");
        let lines = factory.selected.lines();
        assert!(lines.iter().any(|l| l.contains("backend=syslog")));
        assert!(lines.iter().any(|l| l.contains("after setup")));
    }

    #[test]
    fn test_invalid_setting_falls_through() {
        let config = LoggingConfig {
            syslog: Some(Err(InvalidSetting::new("SYSLOG_NETWORK", "pigeon", "unsupported"))),
            file: Some(Ok(FileConfig::new(PathBuf::from("/tmp/app.log")))),
            ..LoggingConfig::default()
        };
        let factory = MockFactory::new(&[BackendKind::File]);
        let outcome = setup_with(&PriorityChain::from_config(&config), &factory);

        assert_eq!(outcome.selected, BackendKind::File);
        // The invalid candidate never reached the factory
        assert_eq!(factory.attempts(), vec![BackendKind::File]);
        assert!(matches!(
            outcome.failures[0].error,
            SetupError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn test_invalid_level_still_selects_syslog() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(std::time::Duration::from_secs(5))).unwrap();
        let address = receiver.local_addr().unwrap().to_string();

        let config = LoggingConfig::from_lookup(|key| match key {
            crate::config::LOG_LEVEL_ENV => Some("verbose".to_string()),
            crate::config::SYSLOG_ADDRESS_ENV => Some(address.clone()),
            _ => None,
        });
        let outcome = setup(&config);
        assert_eq!(outcome.selected, BackendKind::Syslog);
        assert!(outcome.failures.is_empty());

        // Selection notice, then the fallback warning
        let mut buf = [0u8; 8192];
        let n = receiver.recv(&mut buf).unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("backend=syslog"));
        let n = receiver.recv(&mut buf).unwrap();
        let frame = String::from_utf8_lossy(&buf[..n]).into_owned();
        assert!(frame.contains("variable=LOG_LEVEL"), "frame: {}", frame);
        outcome.logger.close().unwrap();
    }

    #[test]
    fn test_default_factory_file_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/app.log");
        let config = LoggingConfig::default().with_file(FileConfig {
            tee_stdout: false,
            ..FileConfig::new(&path)
        });

        let outcome = setup(&config);
        assert_eq!(outcome.selected, BackendKind::File);
        outcome.logger.info("written to file");
        outcome.logger.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("written to file"));
    }
}
