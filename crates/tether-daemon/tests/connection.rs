//! End-to-end connection tests: a real server on a loopback socket, a real
//! framed client, and the shared state inspected from the outside.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use tether_core::{current_time_millis, AgentId, DaemonConfig, SessionId};
use tether_daemon::server::Server;
use tether_daemon::DaemonState;
use tether_protocol::{ClientCodec, ClientMessage, ClientType, ServerMessage};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    state: Arc<DaemonState>,
    port: u16,
    shutdown: CancellationToken,
    token: String,
}

/// Start a daemon on a free loopback port and issue one session token
async fn start_daemon() -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to reserve a port");
    let port = listener.local_addr().expect("No local addr").port();
    drop(listener);

    let mut config = DaemonConfig::default();
    config.listen_port = port;
    let state = Arc::new(DaemonState::new(config.validated()));

    let session_id = SessionId::generate();
    let token = state.tokens.issue_at(&session_id, current_time_millis());

    let shutdown = CancellationToken::new();
    let server = Server::new(Arc::clone(&state), shutdown.clone());
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // wait for the accept loop to come up
    let mut ready = false;
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready, "Server never started listening");

    Harness {
        state,
        port,
        shutdown,
        token,
    }
}

async fn connect(port: u16) -> Framed<TcpStream, ClientCodec> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("Failed to connect");
    Framed::new(stream, ClientCodec::new())
}

async fn recv(framed: &mut Framed<TcpStream, ClientCodec>) -> ServerMessage {
    tokio::time::timeout(RECV_TIMEOUT, framed.next())
        .await
        .expect("Timed out waiting for a server message")
        .expect("Connection closed")
        .expect("Protocol error")
}

async fn handshake(framed: &mut Framed<TcpStream, ClientCodec>, token: &str) {
    framed
        .send(ClientMessage::Handshake {
            token: Some(token.to_string()),
            pairing_code: None,
            client_type: ClientType::Pc,
        })
        .await
        .expect("Failed to send handshake");

    match recv(framed).await {
        ServerMessage::SessionInfo { agents, .. } => assert!(agents.is_empty()),
        other => panic!("Expected session info, got {:?}", other),
    }
}

#[tokio::test]
async fn test_handshake_with_token_yields_session_info() {
    let harness = start_daemon().await;
    let mut client = connect(harness.port).await;
    handshake(&mut client, &harness.token).await;

    assert_eq!(harness.state.clients.len(), 1);
    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_handshake_with_bad_token_is_rejected() {
    let harness = start_daemon().await;
    let mut client = connect(harness.port).await;

    client
        .send(ClientMessage::Handshake {
            token: Some("not-a-token".to_string()),
            pairing_code: None,
            client_type: ClientType::Pc,
        })
        .await
        .expect("Failed to send handshake");

    match recv(&mut client).await {
        ServerMessage::Error { .. } => {}
        other => panic!("Expected an error, got {:?}", other),
    }
    assert_eq!(harness.state.clients.len(), 0);
    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_non_handshake_first_frame_is_rejected() {
    let harness = start_daemon().await;
    let mut client = connect(harness.port).await;

    client
        .send(ClientMessage::Ping)
        .await
        .expect("Failed to send ping");

    match recv(&mut client).await {
        ServerMessage::Error { message, .. } => {
            assert!(message.contains("Handshake"));
        }
        other => panic!("Expected an error, got {:?}", other),
    }
    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_ping_yields_pong() {
    let harness = start_daemon().await;
    let mut client = connect(harness.port).await;
    handshake(&mut client, &harness.token).await;

    client
        .send(ClientMessage::Ping)
        .await
        .expect("Failed to send ping");
    match recv(&mut client).await {
        ServerMessage::Pong { .. } => {}
        other => panic!("Expected pong, got {:?}", other),
    }
    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_input_for_unknown_agent_never_reaches_arbiter() {
    let harness = start_daemon().await;
    let mut client = connect(harness.port).await;
    handshake(&mut client, &harness.token).await;

    client
        .send(ClientMessage::Input {
            agent_id: "no-such-agent".to_string(),
            data: b"ls\n".to_vec(),
        })
        .await
        .expect("Failed to send input");

    match recv(&mut client).await {
        ServerMessage::Error { message, agent_id, .. } => {
            assert!(message.contains("Unknown agent"));
            assert_eq!(agent_id.as_deref(), Some("no-such-agent"));
        }
        other => panic!("Expected an error, got {:?}", other),
    }

    // no ghost writer slot, no audit noise
    let ghost = AgentId::from("no-such-agent");
    assert!(harness.state.arbiter.active_writer(&ghost).is_none());
    assert!(harness.state.arbiter.audit().is_empty());
    harness.shutdown.cancel();
}
