//! Handler implementations
//!
//! The baseline sink is the durable local writer. Every remote handler owns
//! one and writes through it before doing anything remote.

pub mod baseline;
pub mod dispatch;
pub mod metrics_push;
pub mod rotating_file;
pub mod syslog;
pub mod telemetry_push;

#[cfg(test)]
pub(crate) mod capture;

pub use baseline::{BaselineSink, SharedBuffer};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use metrics_push::{MetricsPushConfig, MetricsPushHandler};
pub use rotating_file::{RotatingFile, RotationPolicy};
pub use syslog::{Facility, SyslogConfig, SyslogHandler, SyslogNetwork};
pub use telemetry_push::{TelemetryPushConfig, TelemetryPushHandler};
