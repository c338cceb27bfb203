//! Integration tests: connect, authenticate, command round-trips,
//! watchdog and teardown against a mock RCON server on localhost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rcon_core::{
    AUTH_FAILED_ID, ConnectionState, DisconnectReason, Frame, FrameKind, Parseable, RconClient,
    RconCodec, RconConfig, RconError, ResponseParser,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

const PASSWORD: &str = "secret";

type ServerConn = Framed<TcpStream, RconCodec>;

// ── Helpers ──────────────────────────────────────────────────────

/// Listener on an OS-assigned port plus a config pointing at it.
async fn ephemeral_listener() -> (TcpListener, RconConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RconConfig::new(addr.to_string(), PASSWORD)
        .with_connect_timeout(Duration::from_secs(5));
    (listener, config)
}

/// Accept one client and answer its auth request the way a Source
/// server does: an empty response value, then the verdict.
async fn accept_with_auth_id(listener: &TcpListener, reply: impl Fn(&Frame) -> i32) -> ServerConn {
    let (stream, _) = listener.accept().await.unwrap();
    let mut conn = Framed::new(stream, RconCodec::server());

    let auth = conn.next().await.unwrap().unwrap();
    assert_eq!(auth.kind(), FrameKind::Auth);
    conn.send(Frame::response_value(auth.id(), "").unwrap())
        .await
        .unwrap();
    conn.send(Frame::auth_response(reply(&auth))).await.unwrap();
    conn
}

async fn accept_and_auth(listener: &TcpListener) -> ServerConn {
    accept_with_auth_id(listener, |auth| {
        if auth.body() == PASSWORD {
            auth.id()
        } else {
            AUTH_FAILED_ID
        }
    })
    .await
}

/// Answer every command with "reply to <command>" until the client leaves.
async fn serve_replies(mut conn: ServerConn) {
    while let Some(Ok(frame)) = conn.next().await {
        let body = format!("reply to {}", frame.body());
        if conn
            .send(Frame::response_value(frame.id(), body).unwrap())
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Read commands forever without answering. Returns what was received.
async fn swallow(mut conn: ServerConn) -> Vec<Frame> {
    let mut seen = Vec::new();
    while let Some(Ok(frame)) = conn.next().await {
        seen.push(frame);
    }
    seen
}

fn disconnect_counter(client: &RconClient) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    client.on_disconnect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// ── Authentication ───────────────────────────────────────────────

#[tokio::test]
async fn test_connect_and_status_round_trip() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        let cmd = conn.next().await.unwrap().unwrap();
        assert_eq!(cmd.kind(), FrameKind::ExecCommand);
        assert_eq!(cmd.body(), "status");
        conn.send(Frame::response_value(cmd.id(), "OK").unwrap())
            .await
            .unwrap();
        conn
    });

    let client = RconClient::connect(&config).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.send_command("status").await.unwrap(), "OK");

    let _conn = server.await.unwrap();
}

#[tokio::test]
async fn test_auth_failure_closes_connection() {
    let (listener, mut config) = ephemeral_listener().await;
    config.password = "wrong".into();
    let server = tokio::spawn(async move { accept_and_auth(&listener).await });

    let err = RconClient::connect(&config).await.unwrap_err();
    match err {
        RconError::AuthenticationFailed { endpoint } => {
            assert_eq!(endpoint.to_string(), config.address);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The client side is gone: the server reads end-of-stream.
    let mut conn = server.await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), conn.next())
        .await
        .expect("client left the socket open");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_auth_success_with_arbitrary_id() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let conn = accept_with_auth_id(&listener, |_| 4242).await;
        serve_replies(conn).await;
    });

    let client = RconClient::connect(&config).await.unwrap();
    assert!(client.is_ready());
    assert_eq!(client.send_command("users").await.unwrap(), "reply to users");

    client.dispose();
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_timeout_releases_socket() {
    // Accepted by the kernel backlog but never answered.
    let (listener, config) = ephemeral_listener().await;
    let config = config.with_connect_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = RconClient::connect(&config).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RconError::Timeout(d) if d == Duration::from_millis(200)));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(5));

    // Whatever the client wrote before giving up is followed by EOF.
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut leftover = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut leftover))
        .await
        .expect("socket left open after timeout")
        .unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let (listener, config) = ephemeral_listener().await;
    drop(listener);

    let err = RconClient::connect(&config).await.unwrap_err();
    assert!(matches!(err, RconError::Connect(_)));
}

// ── Command correlation ──────────────────────────────────────────

#[tokio::test]
async fn test_out_of_order_responses() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        let first = conn.next().await.unwrap().unwrap();
        let second = conn.next().await.unwrap().unwrap();
        assert_ne!(first.id(), second.id());

        // Answer the later request first.
        for frame in [&second, &first] {
            let body = format!("reply to {}", frame.body());
            conn.send(Frame::response_value(frame.id(), body).unwrap())
                .await
                .unwrap();
        }
        conn
    });

    let client = RconClient::connect(&config).await.unwrap();
    let (one, two) = tokio::join!(client.send_command("cmd1"), client.send_command("cmd2"));
    assert_eq!(one.unwrap(), "reply to cmd1");
    assert_eq!(two.unwrap(), "reply to cmd2");

    let _conn = server.await.unwrap();
}

#[tokio::test]
async fn test_many_concurrent_commands() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let conn = accept_and_auth(&listener).await;
        serve_replies(conn).await;
    });

    let client = Arc::new(RconClient::connect(&config).await.unwrap());
    let mut handles = Vec::new();
    for i in 0..50 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let reply = client.send_command(&format!("cmd{i}")).await.unwrap();
            assert_eq!(reply, format!("reply to cmd{i}"));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(client.pending_count(), 0);

    client.dispose();
    server.await.unwrap();
}

#[tokio::test]
async fn test_dispose_fails_outstanding_commands() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let conn = accept_and_auth(&listener).await;
        swallow(conn).await
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);

    let mut pending = Vec::new();
    for i in 0..3 {
        pending.push(client.issue(&format!("slow{i}")).await.unwrap());
    }
    assert_eq!(client.pending_count(), 3);

    client.dispose();
    client.dispose();

    for command in pending {
        let result = tokio::time::timeout(Duration::from_secs(5), command.response())
            .await
            .expect("pending command left suspended");
        assert!(matches!(result, Err(RconError::ConnectionClosed)));
    }
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send_command("status").await,
        Err(RconError::NotConnected)
    ));
    // An explicit dispose is not a disconnect.
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 3);
}

// ── Typed responses ──────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Hostname(String);

#[derive(Default)]
struct HostnameParser;

impl ResponseParser for HostnameParser {
    type Output = Hostname;

    fn is_match(&self, body: &str) -> bool {
        body.starts_with("hostname: ")
    }

    fn parse(&self, body: &str) -> rcon_core::Result<Hostname> {
        let name = body["hostname: ".len()..].trim();
        if name.is_empty() {
            return Err(RconError::Parse("empty hostname".into()));
        }
        Ok(Hostname(name.to_owned()))
    }
}

impl Parseable for Hostname {
    type Parser = HostnameParser;
}

#[tokio::test]
async fn test_typed_command_and_parser_errors() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        while let Some(Ok(frame)) = conn.next().await {
            let body = match frame.body() {
                "hostname" => "hostname: Test Server\n",
                "blank" => "hostname:  ",
                _ => "Unknown command",
            };
            conn.send(Frame::response_value(frame.id(), body).unwrap())
                .await
                .unwrap();
        }
    });

    let client = RconClient::connect(&config).await.unwrap();

    let host: Hostname = client.send_command_as("hostname").await.unwrap();
    assert_eq!(host, Hostname("Test Server".into()));

    let err = client.send_command_as::<Hostname>("bogus").await.unwrap_err();
    assert!(matches!(err, RconError::UnexpectedResponse { .. }));

    let err = client
        .send_command_with("blank", &HostnameParser)
        .await
        .unwrap_err();
    assert!(matches!(err, RconError::Parse(_)));

    // Parser failures leave the connection alone.
    assert!(client.is_ready());
    assert_eq!(client.send_command("bogus").await.unwrap(), "Unknown command");

    client.dispose();
    server.await.unwrap();
}

// ── Watchdog and disconnection ───────────────────────────────────

#[tokio::test]
async fn test_watchdog_detects_silent_server() {
    let (listener, config) = ephemeral_listener().await;
    let config = config.with_probe_interval(Duration::from_millis(100));
    let server = tokio::spawn(async move {
        let conn = accept_and_auth(&listener).await;
        swallow(conn).await
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);

    let reason = tokio::time::timeout(Duration::from_secs(5), client.disconnected())
        .await
        .expect("watchdog never fired");
    assert_eq!(reason, DisconnectReason::ProbeTimedOut(Duration::from_millis(100)));

    // Give any duplicate notification a chance to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send_command("status").await,
        Err(RconError::NotConnected)
    ));

    let probes = server.await.unwrap();
    assert_eq!(probes.len(), 1);
    let marker = probes[0].body().strip_prefix("echo ").unwrap();
    assert_eq!(marker.len(), 5);
}

#[tokio::test]
async fn test_watchdog_quiet_while_server_answers() {
    let (listener, config) = ephemeral_listener().await;
    let config = config.with_probe_interval(Duration::from_millis(50));
    let server = tokio::spawn(async move {
        let conn = accept_and_auth(&listener).await;
        serve_replies(conn).await;
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(client.is_ready());
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(client.send_command("status").await.unwrap(), "reply to status");

    client.dispose();
    server.await.unwrap();
}

#[tokio::test]
async fn test_remote_close_notifies_once() {
    let (listener, config) = ephemeral_listener().await;
    let (drop_tx, drop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let conn = accept_and_auth(&listener).await;
        let _ = drop_rx.await;
        drop(conn);
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);
    let pending = client.issue("status").await.unwrap();

    drop_tx.send(()).unwrap();
    server.await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), client.disconnected())
        .await
        .expect("remote close not detected");
    assert_eq!(reason, DisconnectReason::RemoteClosed);
    assert!(matches!(
        pending.response().await,
        Err(RconError::ConnectionClosed)
    ));
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    // Registering after the fact still hears about it, once.
    let late = disconnect_counter(&client);
    assert_eq!(late.load(Ordering::SeqCst), 1);

    assert!(matches!(
        client.send_command("status").await,
        Err(RconError::NotConnected)
    ));
}

#[tokio::test]
async fn test_garbage_from_server_is_connection_loss() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        let _cmd = conn.next().await.unwrap().unwrap();
        let mut stream = conn.into_inner();
        stream.write_all(&[0xFF; 16]).await.unwrap();
        stream
    });

    let client = RconClient::connect(&config).await.unwrap();
    let pending = client.issue("status").await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), client.disconnected())
        .await
        .expect("malformed frame not treated as loss");
    assert!(matches!(reason, DisconnectReason::Transport(_)));
    assert!(matches!(
        pending.response().await,
        Err(RconError::ConnectionClosed)
    ));
    assert_eq!(client.state(), ConnectionState::Closed);

    let _stream = server.await.unwrap();
}

#[tokio::test]
async fn test_slow_reply_within_watchdog_timeout() {
    let (listener, config) = ephemeral_listener().await;
    let config = config
        .with_probe_interval(Duration::from_millis(100))
        .with_probe_timeout(Duration::from_millis(600));
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        while let Some(Ok(frame)) = conn.next().await {
            // Alive but sluggish, slower than one watchdog interval.
            tokio::time::sleep(Duration::from_millis(150)).await;
            let reply = Frame::response_value(frame.id(), frame.body()).unwrap();
            if conn.send(reply).await.is_err() {
                break;
            }
        }
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(client.is_ready());
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    client.dispose();
    server.await.unwrap();
}

// ── Shutdown ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_drop_closes_connection() {
    let (listener, config) = ephemeral_listener().await;
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        tokio::time::timeout(Duration::from_secs(5), conn.next())
            .await
            .expect("client left the socket open after drop")
            .is_none()
    });

    let client = RconClient::connect(&config).await.unwrap();
    drop(client);

    assert!(server.await.unwrap());
}

#[tokio::test]
async fn test_dispose_stops_watchdog() {
    let (listener, config) = ephemeral_listener().await;
    let config = config.with_probe_interval(Duration::from_millis(50));
    let server = tokio::spawn(async move {
        let mut conn = accept_and_auth(&listener).await;
        let mut answered = 0;
        while let Some(Ok(frame)) = conn.next().await {
            answered += 1;
            let reply = Frame::response_value(frame.id(), "").unwrap();
            if conn.send(reply).await.is_err() {
                break;
            }
        }
        answered
    });

    let client = RconClient::connect(&config).await.unwrap();
    let notified = disconnect_counter(&client);
    tokio::time::sleep(Duration::from_millis(300)).await;

    client.dispose();
    let answered = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server still connected after dispose")
        .unwrap();
    assert!(answered >= 1);

    // Several intervals with the client still alive.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Closed);
}
