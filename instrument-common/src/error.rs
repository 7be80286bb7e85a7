use thiserror::Error;

/// Common error type for OpenInstrument agents.
///
/// Most variants describe a failed exchange with the datastore; agents treat
/// all of them as "batch dropped" and carry on with fresh data next cycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error talking to {address}: {source}")]
    Http {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Datastore {address} answered HTTP {status}")]
    Status { address: String, status: u16 },

    #[error("Datastore rejected batch: {0}")]
    Rejected(String),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Protobuf decoding error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid variable: {0}")]
    Variable(String),
}

impl Error {
    /// Wrap a transport-level HTTP failure for `address`.
    pub fn http(address: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Http {
            address: address.into(),
            source,
        }
    }
}

/// Result type alias using the common [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
