//! Handing finished batches to the datastore.

use std::future::Future;

use instrument_common::{Batch, Error, StoreClient};

use crate::config::HostConfig;

/// Datastore failures (unreachable, non-2xx, rejected). Logged by the
/// poller; the batch is dropped.
pub type DispatchError = Error;

/// Sends one host's batch somewhere. Called concurrently for different hosts.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(
        &self,
        host: &HostConfig,
        batch: &Batch,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

impl Dispatch for StoreClient {
    async fn dispatch(&self, host: &HostConfig, batch: &Batch) -> Result<(), DispatchError> {
        let address = host.store.as_deref().ok_or_else(|| {
            Error::Config(format!("host '{}' has no store configured", host.name))
        })?;

        if tracing::enabled!(tracing::Level::TRACE) {
            let dump = serde_json::to_string(batch)?;
            tracing::trace!(host = %host.name, batch = %dump, "Dispatching batch");
        }

        let reply = self.add(address, &batch.to_add_request()).await?;
        tracing::debug!(
            host = %host.name,
            store = address,
            message = reply.errormessage.as_deref().unwrap_or(""),
            "Batch accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{Credentials, Features, SnmpVersion};

    fn host(store: Option<&str>) -> HostConfig {
        HostConfig {
            name: "sw1".into(),
            ip: "10.0.0.2".into(),
            port: 161,
            version: SnmpVersion::V2c,
            credentials: Credentials::Community("public".into()),
            interval: Duration::from_secs(60),
            store: store.map(str::to_string),
            skip: false,
            features: Features::default(),
            timeout: Duration::from_secs(5),
            max_repetitions: 25,
            backoff: false,
        }
    }

    #[tokio::test]
    async fn test_missing_store_is_an_error() {
        let client = StoreClient::new().unwrap();
        let result = client.dispatch(&host(None), &Batch::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let client = StoreClient::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on loopback is closed in test environments.
        let result = client.dispatch(&host(Some("127.0.0.1:9")), &Batch::new()).await;
        assert!(matches!(result, Err(Error::Http { .. })));
    }
}
