//! Integration tests for instrument-common against an in-process datastore.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;

use instrument_common::proto::{AddRequest, AddResponse};
use instrument_common::serialization::{decode, encode};
use instrument_common::{Batch, Error, Sample, StoreClient, Variable};

#[derive(Clone)]
struct FakeStore {
    status: StatusCode,
    reply: AddResponse,
    received: Arc<Mutex<Vec<(String, AddRequest)>>>,
}

async fn add_handler(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let request: AddRequest = decode(&body).expect("agent sent an undecodable body");
    store.received.lock().unwrap().push((content_type, request));
    (store.status, encode(&store.reply))
}

async fn spawn_store(store: FakeStore) -> SocketAddr {
    let app = Router::new()
        .route("/add", post(add_handler))
        .with_state(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn sample_batch() -> Batch {
    let mut batch = Batch::new();
    batch.push(
        Variable::new("/network/interface/stats/ifInOctets")
            .with_label("hostname", "sw1")
            .with_label("srchost", "poller01")
            .with_label("interface", "eth0")
            .with_label("datatype", "counter"),
        Sample::new(1_700_000_000_000, 12345u64),
    );
    batch.push(
        Variable::new("/system/boot/kernel-commandline")
            .with_label("hostname", "sw1")
            .with_label("srchost", "poller01")
            .with_label("datatype", "string"),
        Sample::new(1_700_000_000_000, "root=/dev/sda1"),
    );
    batch
}

#[tokio::test]
async fn test_add_success() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let addr = spawn_store(FakeStore {
        status: StatusCode::OK,
        reply: AddResponse {
            success: true,
            errormessage: None,
        },
        received: received.clone(),
    })
    .await;

    let client = StoreClient::new().unwrap();
    let response = client
        .add(&addr.to_string(), &sample_batch().to_add_request())
        .await
        .expect("add should succeed");
    assert!(response.success);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (content_type, request) = &received[0];
    assert_eq!(content_type, "application/base64");
    assert_eq!(request.stream.len(), 2);

    let first = &request.stream[0];
    assert_eq!(
        first.variable.as_ref().unwrap().name,
        "/network/interface/stats/ifInOctets"
    );
    assert_eq!(first.value[0].double_value, Some(12345.0));
    assert_eq!(
        request.stream[1].value[0].string_value.as_deref(),
        Some("root=/dev/sda1")
    );
}

#[tokio::test]
async fn test_add_rejected() {
    let addr = spawn_store(FakeStore {
        status: StatusCode::OK,
        reply: AddResponse {
            success: false,
            errormessage: Some("read-only store".to_string()),
        },
        received: Arc::new(Mutex::new(Vec::new())),
    })
    .await;

    let client = StoreClient::new().unwrap();
    let err = client
        .add(&addr.to_string(), &sample_batch().to_add_request())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(ref msg) if msg == "read-only store"));
}

#[tokio::test]
async fn test_add_http_error_status() {
    let addr = spawn_store(FakeStore {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        reply: AddResponse {
            success: true,
            errormessage: None,
        },
        received: Arc::new(Mutex::new(Vec::new())),
    })
    .await;

    let client = StoreClient::new().unwrap();
    let err = client
        .add(&addr.to_string(), &sample_batch().to_add_request())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_add_unreachable() {
    // Bind and drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StoreClient::new().unwrap();
    let err = client
        .add(&addr.to_string(), &sample_batch().to_add_request())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { .. }));
}
