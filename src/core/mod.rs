//! Core log fabric types and traits

pub mod error;
pub mod format;
pub mod handler;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod record;
pub mod severity;
pub mod timestamp;
pub mod value;

pub use error::{CloseError, EmitError, Result, SetupError};
pub use format::{LineFormat, OutputFormat};
pub use handler::{Handler, SharedHandler};
pub use log_level::LogLevel;
pub use logger::{global, install, try_global, Logger};
pub use metrics::{DispatchMetrics, LoggerMetrics};
pub use record::{HandlerScope, LogRecord};
pub use severity::{otlp_severity_number, otlp_severity_number_for_name, SyslogSeverity};
pub use timestamp::TimestampFormat;
pub use value::{attr, Attribute, FieldValue};
