//! Handler trait for log emission targets

use super::error::{CloseError, Result};
use super::log_level::LogLevel;
use super::record::LogRecord;
use super::value::Attribute;
use std::sync::Arc;

/// Shared, thread-safe handler reference
pub type SharedHandler = Arc<dyn Handler>;

/// Capability contract implemented by every sink
///
/// Handlers are immutable once built. `with_attributes` and `with_group`
/// return new handlers sharing the underlying writers and connections.
pub trait Handler: Send + Sync {
    /// Whether records at `level` pass this handler's filter
    fn enabled(&self, level: LogLevel) -> bool;

    /// Deliver one record
    ///
    /// The synchronous leg (baseline write, syslog send) is reported through
    /// the result. Remote push legs are dispatched in the background and
    /// never fail the call.
    fn emit(&self, record: &LogRecord) -> Result<()>;

    /// Derive a handler that carries `extra` on every record
    fn with_attributes(&self, extra: &[Attribute]) -> SharedHandler;

    /// Derive a handler that keys later attributes under `name.`
    fn with_group(&self, name: &str) -> SharedHandler;

    /// Release held connections and flush buffers. Safe to call repeatedly.
    fn close(&self) -> std::result::Result<(), CloseError> {
        Ok(())
    }

    fn name(&self) -> &str;
}
