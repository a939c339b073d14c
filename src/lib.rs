//! # Log Fabric
//!
//! Structured log emission with interchangeable backends, chosen once at
//! startup.
//!
//! ## Features
//!
//! - **Durable baseline**: every record is written to a local console or
//!   rotating-file sink, whatever happens to a remote backend
//! - **Remote backends**: syslog (local, UDP, TCP), Loki push and OTLP/HTTP
//!   logs, all embedding a baseline sink
//! - **Non-blocking pushes**: remote payloads go through a bounded queue to
//!   a background worker, so callers never wait on the network
//! - **Priority chain**: OTLP, then Loki, then syslog, then file, then
//!   console, configured from the environment
//!
//! ## Quick start
//!
//! ```no_run
//! use log_fabric::{attr, init_from_env};
//!
//! let logger = init_from_env();
//! logger.warn_with("stock low", &[attr("order_id", 42)]);
//! ```

pub mod config;
pub mod core;
pub mod handlers;
pub mod macros;
pub mod setup;

pub mod prelude {
    pub use crate::config::{FileConfig, LoggingConfig};
    pub use crate::core::{
        attr, Attribute, CloseError, EmitError, FieldValue, Handler, LogLevel, LogRecord, Logger,
        OutputFormat, SetupError, SharedHandler,
    };
    pub use crate::handlers::{
        BaselineSink, MetricsPushConfig, MetricsPushHandler, RotationPolicy, SyslogConfig,
        SyslogHandler, TelemetryPushConfig, TelemetryPushHandler,
    };
    pub use crate::setup::{init_from_env, setup, BackendKind, SetupOutcome};
}

pub use config::{FileConfig, InvalidSetting, LoggingConfig};
pub use core::{
    attr, global, install, try_global, Attribute, CloseError, DispatchMetrics, EmitError,
    FieldValue, Handler, HandlerScope, LineFormat, LogLevel, LogRecord, Logger, LoggerMetrics,
    OutputFormat, Result, SetupError, SharedHandler, TimestampFormat,
};
pub use handlers::{
    BaselineSink, DispatchConfig, MetricsPushConfig, MetricsPushHandler, RotationPolicy,
    SharedBuffer, SyslogConfig, SyslogHandler, SyslogNetwork, TelemetryPushConfig,
    TelemetryPushHandler,
};
pub use setup::{
    init_from_env, setup, setup_with, BackendCandidate, BackendKind, DefaultHandlerFactory,
    HandlerFactory, PriorityChain, SetupOutcome,
};
