use super::*;
use crate::logger::test_support::RecordingLogger;

fn transport(url: &str) -> WsTransport {
    WsTransport::new(url, HeaderMap::new(), Duration::from_millis(500))
}

#[tokio::test]
async fn starts_disconnected() {
    let t = transport("ws://127.0.0.1:1/ws");
    assert_eq!(t.state().await, ConnectionState::Disconnected);
    assert_eq!(t.url(), "ws://127.0.0.1:1/ws");
}

#[tokio::test]
async fn send_without_connection_is_not_connected() {
    let logger = Arc::new(RecordingLogger::default());
    let t = transport("ws://127.0.0.1:1/ws").with_logger(logger.clone());

    let err = t.send_text("hello").await.expect_err("no link");
    assert!(matches!(err, TransportError::NotConnected));

    let err = t.send(&serde_json::json!({ "event": "QUERY" })).await.expect_err("no link");
    assert!(matches!(err, TransportError::NotConnected));

    assert!(logger.lines().iter().any(|line| line.starts_with("error: Cannot send message")));
}

#[tokio::test]
async fn receive_without_connection_is_not_connected() {
    let t = transport("ws://127.0.0.1:1/ws");
    let err = t.receive().await.expect_err("no link");
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn close_without_connection_is_a_no_op() {
    let t = transport("ws://127.0.0.1:1/ws");
    t.close().await;
    t.close().await;
    assert_eq!(t.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn refused_connection_is_handshake_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let t = transport(&format!("ws://{addr}/ws"));
    let err = t.connect().await.expect_err("nothing listening");
    assert!(matches!(err, TransportError::Handshake(_)), "got {err:?}");
    assert_eq!(t.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_server_hits_handshake_timeout() {
    // Accepts TCP but never answers the upgrade.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let t = WsTransport::new(format!("ws://{addr}/ws"), HeaderMap::new(), Duration::from_millis(100));
    let err = t.connect().await.expect_err("no upgrade response");
    assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(100)), "got {err:?}");
    drop(listener);
}

#[tokio::test]
async fn malformed_url_is_invalid_request() {
    let t = transport("not a url");
    let err = t.connect().await.expect_err("bad url");
    assert!(matches!(err, TransportError::InvalidRequest { .. }), "got {err:?}");
}

/// Accepts one upgrade and answers each text message with `ECHO:<text>`.
async fn echo_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("upgrade");
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                if ws.send(Message::text(format!("ECHO:{}", text.as_str()))).await.is_err() {
                    break;
                }
            }
        }
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn string_payload_is_sent_verbatim() {
    let t = transport(&echo_server().await);
    t.connect().await.expect("connect");

    t.send("hello").await.expect("send str");
    assert_eq!(t.receive().await.expect("echo"), "ECHO:hello");

    t.send(&serde_json::json!({ "event": "QUERY" })).await.expect("send object");
    assert_eq!(t.receive().await.expect("echo"), r#"ECHO:{"event":"QUERY"}"#);

    t.close().await;
}

#[tokio::test]
async fn debug_lines_redact_message_bodies() {
    let logger = Arc::new(RecordingLogger::default());
    let t = transport(&echo_server().await).with_logger(logger.clone());
    t.connect().await.expect("connect");

    t.send_text("secret-payload").await.expect("send");
    assert_eq!(t.receive().await.expect("echo"), "ECHO:secret-payload");
    t.close().await;

    let lines = logger.lines();
    assert!(lines.contains(&format!("debug: Message sent: {REDACTED}")), "lines {lines:?}");
    assert!(lines.contains(&format!("debug: Message received: {REDACTED}")), "lines {lines:?}");
    assert!(lines.iter().all(|line| !line.contains("secret-payload")), "lines {lines:?}");
}

#[tokio::test]
async fn cancelled_connect_does_not_stay_connecting() {
    // Accepts TCP but never answers the upgrade.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let t = WsTransport::new(format!("ws://{addr}/ws"), HeaderMap::new(), Duration::from_secs(5));
    let cancelled = tokio::time::timeout(Duration::from_millis(100), t.connect()).await;
    assert!(cancelled.is_err(), "handshake should still be pending");
    assert_eq!(t.state().await, ConnectionState::Disconnected);
    drop(listener);
}

#[tokio::test]
async fn close_wakes_a_pending_receive() {
    let t = Arc::new(transport(&echo_server().await));
    t.connect().await.expect("connect");

    let pending = tokio::spawn({
        let t = t.clone();
        async move { t.receive().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), t.close()).await.expect("close finished");
    let woke = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("receive woke")
        .expect("join");
    assert!(matches!(woke, Err(TransportError::Closed)), "got {woke:?}");
}
