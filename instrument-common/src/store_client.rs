//! HTTP client for the datastore.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;

use crate::error::{Error, Result};
use crate::proto::{AddRequest, AddResponse};
use crate::serialization::{CONTENT_TYPE, decode, encode};

/// Default per-request timeout for datastore calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the datastore's minimal HTTP protocol.
///
/// Cloning is cheap and clones share one connection pool, so a single
/// client can be used concurrently by any number of pollers.
#[derive(Clone, Debug)]
pub struct StoreClient {
    http: reqwest::Client,
}

impl StoreClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Send an `AddRequest` to the datastore at `address` (`host:port`).
    ///
    /// Any non-2xx status or a response with `success = false` is an error.
    pub async fn add(&self, address: &str, request: &AddRequest) -> Result<AddResponse> {
        let url = endpoint(address, "add");
        let body = encode(request);

        tracing::debug!(url = %url, streams = request.stream.len(), bytes = body.len(), "Sending add request");

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::http(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| Error::http(address, e))?;
        let reply: AddResponse = decode(&bytes)?;

        if !reply.success {
            return Err(Error::Rejected(
                reply
                    .errormessage
                    .clone()
                    .unwrap_or_else(|| "no error message".to_string()),
            ));
        }

        Ok(reply)
    }
}

/// Build the URL of a datastore endpoint.
///
/// Addresses may be given with or without an `http://` scheme.
pub fn endpoint(address: &str, path: &str) -> String {
    let base = address
        .strip_prefix("http://")
        .unwrap_or(address)
        .trim_end_matches('/');
    format!("http://{}/{}", base, path.trim_start_matches('/'))
}
