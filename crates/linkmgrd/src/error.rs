//! Error types for linkmgrd.

use thiserror::Error;

/// Errors that can occur in linkmgrd.
///
/// Only configuration errors raised during initialization terminate the
/// process; everything else is logged at the handler that observed it and
/// the affected event is dropped (handlers are total).
#[derive(Debug, Error)]
pub enum LinkMgrError {
    /// Required configuration is missing. Fatal during init (exit code 1),
    /// recoverable afterwards by ignoring the affected port.
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),

    /// A store row carried a value outside its documented domain. The
    /// offending event is dropped.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// The cable driver did not answer a switch or probe request in time.
    /// Handled by retry/backoff in the MUX sub-state-machine.
    #[error("driver timeout on {0}")]
    DriverTimeout(String),

    /// A malformed or out-of-protocol message from the peer ToR.
    #[error("peer protocol violation: {0}")]
    PeerProtocol(String),

    /// Redis connection or operation failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Netlink socket error.
    #[error("netlink error: {0}")]
    Netlink(String),

    /// Heartbeat socket error.
    #[error("probe socket error: {0}")]
    ProbeSocket(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Type-level parse failure from sonic-types.
    #[error(transparent)]
    Parse(#[from] sonic_types::ParseError),
}

impl LinkMgrError {
    /// Returns true if this error must terminate initialization.
    pub fn is_fatal_init(&self) -> bool {
        matches!(self, LinkMgrError::ConfigNotFound(_))
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        LinkMgrError::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result type alias for linkmgrd operations.
pub type Result<T> = std::result::Result<T, LinkMgrError>;
