//! Integration test: boots an in-process WebSocket server playing the
//! Publisher service, connects a real [`Publisher`] over
//! `tokio-tungstenite`, and drives the handshake plus a streamed request.
//!
//! Covers:
//! - lazy connect to `<path>ws` with the `Authorization: Bearer` header
//! - status probe `{type: "status", message_id: 1}` and connected state
//! - log / update / complete routing for one request
//! - JSON text replies alongside CBOR binary ones
//! - `ok: false` rejection
//! - reconnect after the server drops the socket

use std::net::SocketAddr;
use std::time::Duration;

use bfo_publisher::{
    ErrorKind, Publisher, PublisherError, RequestEvent, SessionEvent, SessionState, Value,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const TIMEOUT: Duration = Duration::from_secs(5);

fn map<K: Into<Value>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Value {
    pairs.into_iter().collect()
}

// ── Mini Publisher service: in-process WS server ────────────────────────

/// One accepted client connection.
struct ServiceConn {
    path: String,
    authorization: Option<String>,
    ws: WebSocketStream<TcpStream>,
}

impl ServiceConn {
    /// Next CBOR message from the client.
    async fn recv(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, self.ws.next())
                .await
                .expect("timeout waiting for client frame")
                .expect("client closed connection")
                .expect("websocket error");
            match msg {
                Message::Binary(bytes) => return bfo_cbor::decode(&bytes).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    async fn reply(&mut self, message: Value) {
        self.ws
            .send(Message::Binary(bfo_cbor::encode(&message)))
            .await
            .unwrap();
    }

    async fn reply_json(&mut self, json: &str) {
        self.ws.send(Message::Text(json.to_string())).await.unwrap();
    }

    /// Receive the status probe and answer it.
    async fn handshake(&mut self) -> u64 {
        let probe = self.recv().await;
        assert_eq!(probe.get("type").and_then(Value::as_str), Some("status"));
        let id = probe.get("message_id").and_then(Value::as_u64).unwrap();
        self.reply(map([
            ("reply_to", Value::from(id)),
            ("ok", Value::Bool(true)),
            ("type", Value::from("status-response")),
            ("version", Value::from("test-service")),
        ]))
        .await;
        id
    }
}

async fn start_service() -> (SocketAddr, mpsc::Receiver<ServiceConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let (head_tx, head_rx) = oneshot::channel();
                let callback = move |req: &Request, resp: Response| {
                    let auth = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let _ = head_tx.send((req.uri().path().to_owned(), auth));
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                let Ok((path, authorization)) = head_rx.await else {
                    return;
                };
                let _ = conn_tx
                    .send(ServiceConn {
                        path,
                        authorization,
                        ws,
                    })
                    .await;
            });
        }
    });

    (addr, conn_rx)
}

async fn accept(conns: &mut mpsc::Receiver<ServiceConn>) -> ServiceConn {
    tokio::time::timeout(TIMEOUT, conns.recv())
        .await
        .expect("timeout waiting for client connection")
        .expect("service stopped")
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_over_websocket() {
    let (addr, mut conns) = start_service().await;
    let publisher = Publisher::builder()
        .url(format!("http://{addr}/publisher?ignored=1"))
        .authorization("s3cret")
        .build()
        .unwrap();
    let mut events = publisher.subscribe();

    // Nothing connects until asked.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conns.try_recv().is_err());

    publisher.connect();
    let mut conn = accept(&mut conns).await;
    assert_eq!(conn.path, "/publisher/ws");
    assert_eq!(conn.authorization.as_deref(), Some("Bearer s3cret"));

    assert_eq!(conn.handshake().await, 1);
    tokio::time::timeout(TIMEOUT, publisher.wait_connected())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(publisher.state(), SessionState::Connected);
    let status = publisher.status().unwrap();
    assert_eq!(status.get("version").and_then(Value::as_str), Some("test-service"));
    assert!(status.get("reply_to").is_none());
    match events.recv().await.unwrap() {
        SessionEvent::Connected { status: s } => assert_eq!(s, status),
        other => panic!("expected Connected, got {other:?}"),
    }
}

#[tokio::test]
async fn streamed_request_roundtrip() {
    let (addr, mut conns) = start_service().await;
    let publisher = Publisher::builder()
        .url(format!("http://{addr}/"))
        .authorization("s3cret")
        .build()
        .unwrap();

    let client = publisher.clone();
    let pending = tokio::spawn(async move {
        client
            .request(map([
                ("type", Value::from("convert")),
                ("authorization", Value::from("s3cret")),
                ("put", Value::Array(vec![])),
            ]))
            .await
    });

    let mut conn = accept(&mut conns).await;
    conn.handshake().await;

    let sent = conn.recv().await;
    assert_eq!(sent.get("type").and_then(Value::as_str), Some("convert"));
    // Already sent as a header, so not repeated in-band.
    assert!(sent.get("authorization").is_none());
    let id = sent.get("message_id").and_then(Value::as_u64).unwrap();
    assert_eq!(id, 2);

    let mut request = pending.await.unwrap().unwrap();
    assert_eq!(request.id(), id);
    assert_eq!(request.kind(), "convert");

    conn.reply(map([
        ("reply_to", Value::from(id)),
        ("ok", Value::Bool(true)),
        ("type", Value::from("log")),
        ("log", Value::from("converting")),
    ]))
    .await;
    conn.reply_json(&format!(
        r#"{{"reply_to": {id}, "ok": true, "type": "convert-response", "complete": false, "progress": 0.5}}"#
    ))
    .await;
    conn.reply(map([
        ("reply_to", Value::from(id)),
        ("ok", Value::Bool(true)),
        ("type", Value::from("convert-response")),
        ("complete", Value::Bool(true)),
        ("content", Value::from(b"%PDF-1.7".to_vec())),
    ]))
    .await;

    let mut seen = Vec::new();
    while let Some(event) = tokio::time::timeout(TIMEOUT, request.next_event()).await.unwrap() {
        let last = event.is_final();
        seen.push(event);
        if last {
            break;
        }
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], RequestEvent::Log(Value::from("converting")));
    match &seen[1] {
        RequestEvent::Update(update) => {
            assert_eq!(update.get("progress").and_then(Value::as_f64), Some(0.5))
        }
        other => panic!("expected Update, got {other:?}"),
    }
    match &seen[2] {
        RequestEvent::Complete(done) => {
            assert_eq!(done.get("content").and_then(Value::as_bytes), Some(&b"%PDF-1.7"[..]))
        }
        other => panic!("expected Complete, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_request() {
    let (addr, mut conns) = start_service().await;
    let publisher = Publisher::builder()
        .url(format!("http://{addr}/"))
        .build()
        .unwrap();
    publisher.connect();
    let mut conn = accept(&mut conns).await;
    assert_eq!(conn.authorization, None);
    conn.handshake().await;
    publisher.wait_connected().await.unwrap();

    let request = publisher
        .request(map([("type", "convert")]))
        .await
        .unwrap();
    let sent = conn.recv().await;
    conn.reply(map([
        ("reply_to", sent.get("message_id").cloned().unwrap()),
        ("ok", Value::Bool(false)),
        ("message", Value::from("No put array")),
    ]))
    .await;

    match tokio::time::timeout(TIMEOUT, request.response()).await.unwrap() {
        Err(PublisherError::Rejected { message, response }) => {
            assert_eq!(message, "No put array");
            assert_eq!(response.get("ok"), Some(&Value::Bool(false)));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(publisher.is_connected());
}

#[tokio::test]
async fn garbage_frames_raise_errors_but_keep_the_session() {
    let (addr, mut conns) = start_service().await;
    let publisher = Publisher::builder()
        .url(format!("http://{addr}/"))
        .build()
        .unwrap();
    let mut events = publisher.subscribe();
    publisher.connect();
    let mut conn = accept(&mut conns).await;

    conn.ws.send(Message::Binary(vec![0xff])).await.unwrap();
    conn.handshake().await;
    tokio::time::timeout(TIMEOUT, publisher.wait_connected())
        .await
        .unwrap()
        .unwrap();

    match events.recv().await.unwrap() {
        SessionEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::Decode),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (addr, mut conns) = start_service().await;
    let publisher = Publisher::builder()
        .url(format!("http://{addr}/"))
        .min_backoff(Duration::from_millis(20))
        .max_backoff(Duration::from_millis(200))
        .build()
        .unwrap();
    let mut state = publisher.watch_state();

    publisher.connect();
    let mut conn = accept(&mut conns).await;
    assert_eq!(conn.handshake().await, 1);
    publisher.wait_connected().await.unwrap();

    conn.ws.close(None).await.unwrap();
    drop(conn);
    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s != SessionState::Connected))
        .await
        .unwrap()
        .unwrap();

    // Ids are never reused across connections.
    let mut conn = accept(&mut conns).await;
    assert_eq!(conn.handshake().await, 2);
    tokio::time::timeout(TIMEOUT, publisher.wait_connected())
        .await
        .unwrap()
        .unwrap();

    publisher.disconnect();
    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s == SessionState::Closed))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(conns.try_recv().is_err());
}
