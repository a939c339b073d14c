//! Logging macros for ergonomic log message formatting.
//!
//! These macros format the message like `format!` and accept an optional
//! attribute list after a `;`. Emission failures are reported on stderr,
//! the same way the level helpers on [`Logger`](crate::Logger) do.
//!
//! # Examples
//!
//! ```
//! use log_fabric::prelude::*;
//! use log_fabric::{info, warn};
//!
//! let logger = Logger::console();
//!
//! info!(logger, "Server started");
//!
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//!
//! let order_id = 42;
//! warn!(logger, "Stock low for order {}", order_id; "order_id" => order_id, "sku" => "A-17");
//! ```

/// Log a message at an explicit level.
///
/// # Examples
///
/// ```
/// # use log_fabric::prelude::*;
/// # let logger = Logger::console();
/// use log_fabric::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500; "retryable" => false);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $fmt:literal $(, $arg:expr)* ; $($key:expr => $value:expr),+ $(,)?) => {
        $logger.log_reported(
            $level,
            format!($fmt $(, $arg)*),
            &[$($crate::Attribute::new($key, $value)),+],
        )
    };
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_reported($level, format!($($arg)+), &[])
    };
}

/// Log a debug-level message.
///
/// # Examples
///
/// ```
/// # use log_fabric::prelude::*;
/// # let logger = Logger::console();
/// use log_fabric::debug;
/// debug!(logger, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log an error-level message.
///
/// # Examples
///
/// ```
/// # use log_fabric::prelude::*;
/// # let logger = Logger::console();
/// use log_fabric::error;
/// error!(logger, "Failed to connect to database");
/// error!(logger, "Error code: {}, message: {}", 500, "Internal error"; "attempt" => 3);
/// ```
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}
