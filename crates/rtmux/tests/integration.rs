use async_trait::async_trait;
use rtmux::{Connector, DuplexTransport, Endpoint, EndpointConfig, RequestError};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Hands out a single pre-built transport, then refuses further dials.
/// Sufficient for these tests since every one of them runs with
/// `reconnect = false`.
struct OnceConnector(Mutex<Option<DuplexTransport>>);

impl OnceConnector {
    fn new(transport: DuplexTransport) -> Self {
        Self(Mutex::new(Some(transport)))
    }
}

#[async_trait]
impl Connector for OnceConnector {
    type Transport = DuplexTransport;

    async fn connect(&self) -> anyhow::Result<DuplexTransport> {
        self.0
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("OnceConnector already used"))
    }
}

fn fast_config() -> EndpointConfig {
    EndpointConfig {
        timeout: Duration::from_millis(250),
        ..EndpointConfig::default()
    }
}

/// Never produces a transport; used to keep `supervisor::start` parked in its
/// reconnect backoff sleep so tests can exercise `close()` landing in that
/// window.
struct AlwaysFailConnector;

#[async_trait]
impl Connector for AlwaysFailConnector {
    type Transport = DuplexTransport;

    async fn connect(&self) -> anyhow::Result<DuplexTransport> {
        Err(anyhow::anyhow!("no peer to dial in this test"))
    }
}

#[tokio::test]
async fn request_echoes_through_a_handler() {
    let client = Endpoint::new("client", fast_config());
    let server = Endpoint::new("server", fast_config());
    server.set_event("echo", |args, _kwargs| Ok(args));

    let (client_transport, server_transport) = DuplexTransport::pair(8);
    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    let result = client
        .request("echo", Value::from("hello"), Value::Object(Default::default()))
        .await
        .unwrap();
    assert_eq!(result, Value::from("hello"));
}

#[tokio::test]
async fn handler_error_surfaces_as_remote_error() {
    let client = Endpoint::new("client", fast_config());
    let server = Endpoint::new("server", fast_config());
    server.set_event("boom", |_args, _kwargs| Err("kaboom".to_string()));

    let (client_transport, server_transport) = DuplexTransport::pair(8);
    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    let error = client
        .request("boom", Value::Null, Value::Object(Default::default()))
        .await
        .unwrap_err();
    assert_eq!(error, RequestError::RemoteError("kaboom".to_string()));
}

#[tokio::test]
async fn unknown_event_returns_event_not_found() {
    let client = Endpoint::new("client", fast_config());
    let server = Endpoint::new("server", fast_config());

    let (client_transport, server_transport) = DuplexTransport::pair(8);
    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    let error = client
        .request("does_not_exist", Value::Null, Value::Object(Default::default()))
        .await
        .unwrap_err();
    assert_eq!(error, RequestError::EventNotFound("does_not_exist".to_string()));
}

#[tokio::test]
async fn request_times_out_when_no_response_arrives() {
    let client = Endpoint::new("client", fast_config());
    let (client_transport, server_transport) = DuplexTransport::pair(8);
    // Kept alive (not dropped) so the channel stays open and the client's
    // receiver genuinely blocks instead of seeing an immediate close; never
    // driven by any loop, so nothing will ever answer.
    let _server_transport = server_transport;

    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });

    client.wait_until_ready().await;
    let error = client
        .request("echo", Value::Null, Value::Object(Default::default()))
        .await
        .unwrap_err();
    assert_eq!(error, RequestError::Timeout);
}

#[tokio::test]
async fn closing_the_connection_drains_pending_requests() {
    let client = Endpoint::new("client", EndpointConfig {
        timeout: Duration::from_secs(5),
        ..EndpointConfig::default()
    });
    let server = Endpoint::new("server", fast_config());
    // Never responds, so the request would otherwise hang until timeout.
    server.set_event_async("stall", |_args, _kwargs| async move {
        std::future::pending::<()>().await;
        unreachable!()
    });

    let (client_transport, server_transport) = DuplexTransport::pair(8);
    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    let request = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .request("stall", Value::Null, Value::Object(Default::default()))
                .await
        }
    });

    // Give the request a moment to land in the wait set before closing.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close().await;

    let error = request.await.unwrap().unwrap_err();
    assert_eq!(error, RequestError::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn handles_many_concurrent_echoes() {
    let client = Endpoint::new("client", fast_config());
    let server = Endpoint::new("server", fast_config());
    server.set_event("echo", |args, _kwargs| Ok(args));

    let (client_transport, server_transport) = DuplexTransport::pair(64);
    tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    let mut tasks = Vec::new();
    for i in 0..100 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .request("echo", Value::from(i), Value::Object(Default::default()))
                .await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, Value::from(i as i64));
    }
}

#[tokio::test]
async fn close_during_reconnect_backoff_stops_promptly() {
    let client = Endpoint::new(
        "client",
        EndpointConfig {
            reconnect_backoff: Duration::from_secs(60),
            ..fast_config()
        },
    );

    let supervisor = tokio::spawn({
        let client = client.clone();
        async move { client.start(AlwaysFailConnector, true).await }
    });

    // Give `start` a moment to fail its first dial and enter the 60s backoff
    // sleep, then close while parked there.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close().await;

    tokio::time::timeout(Duration::from_secs(1), supervisor)
        .await
        .expect("close() during reconnect backoff must not wait out the backoff")
        .unwrap();
}

#[tokio::test]
async fn ready_flag_clears_across_a_disconnect_reconnect_cycle() {
    let client = Endpoint::new("client", fast_config());
    let server = Endpoint::new("server", fast_config());

    let (client_transport, server_transport) = DuplexTransport::pair(8);
    let supervisor = tokio::spawn({
        let client = client.clone();
        async move { client.start(OnceConnector::new(client_transport), false).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.start(OnceConnector::new(server_transport), false).await }
    });

    client.wait_until_ready().await;
    assert!(client.is_ready());

    client.close().await;
    supervisor.await.unwrap();

    assert!(!client.is_ready(), "is_ready() must clear once the connection is torn down");
}
