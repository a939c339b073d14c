//! Error types for the log fabric
//!
//! Three failure domains are kept apart:
//! - [`SetupError`]: a backend could not be constructed. The setup chain
//!   treats this as "try the next candidate".
//! - [`EmitError`]: a synchronous leg of an emission failed (baseline write
//!   or syslog send). Returned to the caller.
//! - [`CloseError`]: releasing a handler's resources failed. Reported only.
//!
//! Failures of the asynchronous push leg never surface as errors; they are
//! counted in [`DispatchMetrics`](super::metrics::DispatchMetrics).

pub type Result<T> = std::result::Result<T, EmitError>;

/// Backend construction failure
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// IO error while preparing a local target (directory, file)
    #[error("IO error while {operation} '{path}': {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Remote endpoint failed the reachability check
    #[error("Endpoint '{endpoint}' is unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    /// Syslog transport could not be dialed
    #[error("Failed to create syslog writer ({network} {address}): {source}")]
    Transport {
        network: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Dispatcher runtime or HTTP client could not be built
    #[error("Failed to start dispatcher for {component}: {message}")]
    Runtime { component: String, message: String },
}

impl SetupError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        SetupError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an IO error with the operation and path that failed
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        SetupError::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an unreachable endpoint error
    pub fn unreachable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        SetupError::Unreachable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a syslog transport error
    pub fn transport(
        network: impl Into<String>,
        address: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        SetupError::Transport {
            network: network.into(),
            address: address.into(),
            source,
        }
    }

    /// Create a runtime error
    pub fn runtime(component: impl Into<String>, message: impl Into<String>) -> Self {
        SetupError::Runtime {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Synchronous emission failure
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// Baseline write failed
    #[error("Failed to write log line to {target}: {source}")]
    Write {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Syslog send failed
    #[error("Syslog send failed: {source}")]
    Transport {
        #[source]
        source: std::io::Error,
    },

    /// Handler was closed before the emit
    #[error("Handler '{handler}' is closed")]
    Closed { handler: String },
}

impl EmitError {
    /// Create a write error for the named target
    pub fn write(target: impl Into<String>, source: std::io::Error) -> Self {
        EmitError::Write {
            target: target.into(),
            source,
        }
    }

    /// Create a transport error
    pub fn transport(source: std::io::Error) -> Self {
        EmitError::Transport { source }
    }

    /// Create a closed-handler error
    pub fn closed(handler: impl Into<String>) -> Self {
        EmitError::Closed {
            handler: handler.into(),
        }
    }
}

/// Shutdown failure
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    /// Final flush of a local target failed
    #[error("Failed to flush {target} on close: {source}")]
    Flush {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Releasing the syslog transport failed
    #[error("Failed to close syslog transport: {source}")]
    Transport {
        #[source]
        source: std::io::Error,
    },

    /// Dispatcher worker did not shut down cleanly
    #[error("Dispatcher for {component} did not stop cleanly")]
    Dispatcher { component: String },
}

impl CloseError {
    /// Create a flush error
    pub fn flush(target: impl Into<String>, source: std::io::Error) -> Self {
        CloseError::Flush {
            target: target.into(),
            source,
        }
    }
}
