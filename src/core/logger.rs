//! Logger front end and process-wide installation
//!
//! A [`Logger`] is what application code holds: a cheap, cloneable wrapper
//! around one [`SharedHandler`] plus emission metrics. The process-wide
//! logger is installed exactly once with [`install`]; there is no later
//! reassignment.

use super::{
    error::{CloseError, EmitError},
    handler::SharedHandler,
    log_level::LogLevel,
    metrics::LoggerMetrics,
    record::LogRecord,
    value::Attribute,
};
use crate::handlers::BaselineSink;
use std::sync::{Arc, OnceLock};

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

#[derive(Clone)]
pub struct Logger {
    handler: SharedHandler,
    metrics: Arc<LoggerMetrics>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("handler", &self.handler.name())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl Logger {
    #[must_use]
    pub fn new(handler: SharedHandler) -> Self {
        Self {
            handler,
            metrics: Arc::new(LoggerMetrics::new()),
        }
    }

    /// Logger writing to stdout at `Info` and above
    #[must_use]
    pub fn console() -> Self {
        Self::new(Arc::new(BaselineSink::stdout(LogLevel::Info)))
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.handler.enabled(level)
    }

    /// Emit a prepared record, reporting synchronous failures
    pub fn log_record(&self, record: &LogRecord) -> Result<(), EmitError> {
        if !self.handler.enabled(record.level()) {
            self.metrics.record_filtered();
            return Ok(());
        }

        match self.handler.emit(record) {
            Ok(()) => {
                self.metrics.record_emitted();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failed();
                Err(e)
            }
        }
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl AsRef<str>,
        attrs: &[Attribute],
    ) -> Result<(), EmitError> {
        if !self.handler.enabled(level) {
            self.metrics.record_filtered();
            return Ok(());
        }
        let record = LogRecord::new(level, message).with_attributes(attrs.iter().cloned());
        self.log_record(&record)
    }

    /// Emit and report failures on stderr instead of to the caller
    pub fn log_reported(&self, level: LogLevel, message: impl AsRef<str>, attrs: &[Attribute]) {
        if let Err(e) = self.log(level, message, attrs) {
            eprintln!("[LOGGER ERROR] Handler '{}' failed: {}", self.handler.name(), e);
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log_reported(LogLevel::Debug, message, &[]);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log_reported(LogLevel::Info, message, &[]);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log_reported(LogLevel::Warn, message, &[]);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log_reported(LogLevel::Error, message, &[]);
    }

    pub fn debug_with(&self, message: impl AsRef<str>, attrs: &[Attribute]) {
        self.log_reported(LogLevel::Debug, message, attrs);
    }

    pub fn info_with(&self, message: impl AsRef<str>, attrs: &[Attribute]) {
        self.log_reported(LogLevel::Info, message, attrs);
    }

    pub fn warn_with(&self, message: impl AsRef<str>, attrs: &[Attribute]) {
        self.log_reported(LogLevel::Warn, message, attrs);
    }

    pub fn error_with(&self, message: impl AsRef<str>, attrs: &[Attribute]) {
        self.log_reported(LogLevel::Error, message, attrs);
    }

    /// Derive a logger whose records carry `attrs`
    ///
    /// The derived logger shares this logger's metrics.
    #[must_use]
    pub fn with(&self, attrs: &[Attribute]) -> Logger {
        Logger {
            handler: self.handler.with_attributes(attrs),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Derive a logger whose later attributes are keyed under `name.`
    #[must_use]
    pub fn with_group(&self, name: &str) -> Logger {
        Logger {
            handler: self.handler.with_group(name),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn close(&self) -> Result<(), CloseError> {
        self.handler.close()
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }
}

/// Install `logger` as the process-wide logger
///
/// Succeeds once. Later calls hand the rejected logger back.
pub fn install(logger: Logger) -> Result<&'static Logger, Logger> {
    let mut candidate = Some(logger);
    let installed = GLOBAL_LOGGER.get_or_init(|| candidate.take().unwrap_or_else(Logger::console));
    match candidate {
        None => Ok(installed),
        Some(rejected) => Err(rejected),
    }
}

/// The installed logger, if any
pub fn try_global() -> Option<&'static Logger> {
    GLOBAL_LOGGER.get()
}

/// The installed logger, installing a console logger if none was set up
pub fn global() -> &'static Logger {
    GLOBAL_LOGGER.get_or_init(Logger::console)
}
