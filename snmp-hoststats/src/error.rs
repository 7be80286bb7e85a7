//! Error types for the SNMP host poller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or reloading the host configuration.
///
/// Fatal at startup. On reload the previous snapshot stays active.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Host '{host}': invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        host: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Host '{host}': missing required key '{key}'")]
    MissingKey { host: String, key: String },
}

/// SNMP transport failures. A host that fails this way yields no metrics
/// for the affected walk but never stops the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timeout walking {prefix}")]
    Timeout { prefix: String },

    #[error("cannot open session to {address}: {message}")]
    Session { address: String, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("agent returned error status {status} (index {index})")]
    Agent { status: u32, index: u32 },

    #[error("invalid OID '{0}'")]
    InvalidOid(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}
