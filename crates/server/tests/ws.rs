//! WebSocket subscriber tests against a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_office_core::{DomainEvent, EventMeta};
use agent_office_server::live::hub::{BroadcastHub, HubConfig};
use agent_office_server::live::pipeline::deliver;
use agent_office_server::live::registry::{RegistryConfig, SessionRegistry};
use agent_office_server::{create_app, AppState, OfficeConfig};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

async fn serve(config: OfficeConfig) -> TestServer {
    let registry = Arc::new(SessionRegistry::new(RegistryConfig::from_office(&config)));
    let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry), HubConfig::default()));
    let state = AppState::new(config, registry, hub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    TestServer { addr, state }
}

async fn connect(addr: SocketAddr) -> Result<Client, tungstenite::Error> {
    tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws"))
        .await
        .map(|(ws, _)| ws)
}

/// Next text frame whose `type` is `wanted`, skipping others.
async fn next_of_type(client: &mut Client, wanted: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = client.next().await.expect("stream open").expect("frame");
            if let Message::Text(text) = msg {
                let v: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if v["type"] == wanted {
                    return v;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {wanted} frame within timeout"))
}

#[tokio::test]
async fn test_subscriber_gets_snapshot_then_events() {
    let server = serve(OfficeConfig::default()).await;
    let mut client = connect(server.addr).await.unwrap();

    let snapshot = next_of_type(&mut client, "snapshot").await;
    assert!(snapshot["agents"].as_array().unwrap().is_empty());
    assert!(snapshot["stats"]["totalSessions"].is_number());

    let event = DomainEvent::session_started(EventMeta::for_session("S1", Utc::now()), None, Some("proj".into()));
    deliver(&server.state.registry, &server.state.hub, &event).await;

    let frame = next_of_type(&mut client, "event").await;
    assert_eq!(frame["event"]["type"], "session");
    assert_eq!(frame["event"]["kind"], "started");
    assert_eq!(frame["event"]["sessionId"], "S1");
}

#[tokio::test]
async fn test_ping_pong() {
    let server = serve(OfficeConfig::default()).await;
    let mut client = connect(server.addr).await.unwrap();
    next_of_type(&mut client, "snapshot").await;

    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    next_of_type(&mut client, "pong").await;
}

#[tokio::test]
async fn test_per_address_cap_rejects_before_upgrade_and_releases_on_close() {
    let server = serve(OfficeConfig {
        max_connections_per_ip: 1,
        ..Default::default()
    })
    .await;

    let mut first = connect(server.addr).await.unwrap();
    next_of_type(&mut first, "snapshot").await;

    match connect(server.addr).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 429),
        other => panic!("expected HTTP 429 rejection, got {:?}", other.map(|_| ())),
    }

    first.close(None).await.unwrap();
    drop(first);

    // The permit is released once the server side notices the close.
    let reconnected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(client) = connect(server.addr).await {
                return client;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok());
}

#[tokio::test]
async fn test_global_cap_answers_503() {
    let server = serve(OfficeConfig {
        max_connections: 1,
        ..Default::default()
    })
    .await;

    let mut first = connect(server.addr).await.unwrap();
    next_of_type(&mut first, "snapshot").await;

    match connect(server.addr).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("expected HTTP 503 rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_hub_shutdown_closes_subscribers() {
    let server = serve(OfficeConfig::default()).await;
    let mut client = connect(server.addr).await.unwrap();
    next_of_type(&mut client, "snapshot").await;

    server.state.hub.shutdown().await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
