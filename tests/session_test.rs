//! End-to-end tests against a relay bound to an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_relay::{serve, Config, Identity, TokenVerifier};

const SECRET: &str = "integration-secret";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Running relay, stopped on drop
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start(typing_timeout: Duration) -> Self {
        Self::start_with(Config {
            typing_timeout,
            ..Config::default()
        })
        .await
    }

    async fn start_with(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = Config {
            addr: addr.to_string(),
            jwt_secret: SECRET.to_string(),
            ..config
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            serve(listener, config, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        TestServer {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    fn url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/?token={}", self.addr, token),
            None => format!("ws://{}/", self.addr),
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = timeout(Duration::from_secs(5), task).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn token_for(name: &str) -> String {
    TokenVerifier::new(SECRET.as_bytes(), Duration::from_secs(60))
        .issue(&Identity::parse(name).unwrap())
        .unwrap()
}

async fn connect(server: &TestServer, name: &str) -> Ws {
    let (ws, _) = connect_async(server.url(Some(token_for(name).as_str()))).await.unwrap();
    ws
}

/// Next JSON event, skipping control frames
async fn recv(ws: &mut Ws) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(_) => panic!("connection closed"),
            _ => continue,
        }
    }
}

/// Assert no JSON event arrives within `wait`
async fn assert_quiet(ws: &mut Ws, wait: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(wait, ws.next()).await {
        panic!("unexpected event: {}", text);
    }
}

/// Keep reading (and so answering pings) for `period`; fails on any event or close
async fn keep_polling(ws: &mut Ws, period: Duration) {
    let deadline = Instant::now() + period;
    loop {
        match timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected event: {}", text),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                panic!("connection closed while polling")
            }
            Ok(Some(Ok(_))) => continue,
        }
    }
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Read until the server closes the connection, returning any text events seen
async fn drain_until_closed(ws: &mut Ws) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => events.push(serde_json::from_str(&text).unwrap()),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return events,
            Ok(Some(Ok(_))) => continue,
            Err(_) => panic!("server did not close the connection"),
        }
    }
}

#[tokio::test]
async fn test_missing_token_gets_auth_error() {
    let server = TestServer::start(Duration::from_secs(3)).await;

    let (mut ws, _) = connect_async(server.url(None)).await.unwrap();
    let events = drain_until_closed(&mut ws).await;
    assert_eq!(events, vec![json!({"type": "authError"})]);

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_token_gets_auth_error() {
    let server = TestServer::start(Duration::from_secs(3)).await;

    let forged = TokenVerifier::new(b"wrong-secret", Duration::from_secs(60))
        .issue(&Identity::parse("alice").unwrap())
        .unwrap();
    let (mut ws, _) = connect_async(server.url(Some(forged.as_str()))).await.unwrap();
    let events = drain_until_closed(&mut ws).await;
    assert_eq!(events, vec![json!({"type": "authError"})]);

    server.stop().await;
}

#[tokio::test]
async fn test_chat_scenario() {
    let server = TestServer::start(Duration::from_secs(3)).await;

    // alice joins an empty room
    let mut alice = connect(&server, "alice").await;
    let history = recv(&mut alice).await;
    assert_eq!(history["type"], "messageHistory");
    assert_eq!(history["sender"], "alice");
    assert_eq!(history["history"], json!([]));

    // Claimed sender is ignored
    send(
        &mut alice,
        json!({"type": "sendMessage", "text": "hi", "sender": "mallory"}),
    )
    .await;
    let echo = recv(&mut alice).await;
    assert_eq!(echo["type"], "receiveMessage");
    assert_eq!(echo["text"], "hi");
    assert_eq!(echo["sender"], "alice");
    assert!(echo["datetime"].is_string());

    // bob joins later and sees alice's message in history
    let mut bob = connect(&server, "bob").await;
    let history = recv(&mut bob).await;
    assert_eq!(history["sender"], "bob");
    let replayed = history["history"].as_array().unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["text"], "hi");
    assert_eq!(replayed[0]["sender"], "alice");

    // alice is not sent a duplicate
    assert_quiet(&mut alice, Duration::from_millis(200)).await;

    // bob's message reaches both
    send(&mut bob, json!({"type": "sendMessage", "text": "hello alice"})).await;
    assert_eq!(recv(&mut alice).await["text"], "hello alice");
    assert_eq!(recv(&mut bob).await["text"], "hello alice");

    server.stop().await;
}

#[tokio::test]
async fn test_empty_and_malformed_input_keep_connection() {
    let server = TestServer::start(Duration::from_secs(3)).await;
    let mut alice = connect(&server, "alice").await;
    recv(&mut alice).await;

    send(&mut alice, json!({"type": "sendMessage", "text": "   "})).await;
    let err = recv(&mut alice).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "empty_message");

    alice
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    let err = recv(&mut alice).await;
    assert_eq!(err["code"], "invalid_message");

    send(&mut alice, json!({"type": "sendMessage", "text": "still here"})).await;
    assert_eq!(recv(&mut alice).await["text"], "still here");

    server.stop().await;
}

#[tokio::test]
async fn test_typing_presence_over_the_wire() {
    let server = TestServer::start(Duration::from_millis(300)).await;
    let mut alice = connect(&server, "alice").await;
    recv(&mut alice).await;
    let mut bob = connect(&server, "bob").await;
    recv(&mut bob).await;

    send(&mut alice, json!({"type": "typing"})).await;
    send(&mut alice, json!({"type": "typing"})).await;

    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "typing", "sender": "alice"})
    );

    // alice leaves without stopTyping; bob sees the timeout
    alice.close(None).await.unwrap();
    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "stopTyping", "sender": "alice"})
    );
    assert_quiet(&mut bob, Duration::from_millis(500)).await;

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let server = TestServer::start(Duration::from_secs(3)).await;
    let mut alice = connect(&server, "alice").await;
    recv(&mut alice).await;

    server.stop().await;

    assert!(drain_until_closed(&mut alice).await.is_empty());
}

fn fast_heartbeat() -> Config {
    Config {
        ping_interval: Duration::from_millis(100),
        ping_timeout: Duration::from_millis(100),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_silent_client_dropped_by_heartbeat() {
    let server = TestServer::start_with(fast_heartbeat()).await;
    let mut carol = connect(&server, "carol").await;
    recv(&mut carol).await;
    let mut bob = connect(&server, "bob").await;
    recv(&mut bob).await;

    // carol never reads, so never answers a ping
    keep_polling(&mut bob, Duration::from_millis(400)).await;

    // bob's broadcast no longer reaches carol
    send(&mut bob, json!({"type": "sendMessage", "text": "anyone?"})).await;
    assert_eq!(recv(&mut bob).await["text"], "anyone?");

    let events = drain_until_closed(&mut carol).await;
    assert!(events.is_empty(), "carol got {:?}", events);

    server.stop().await;
}

#[tokio::test]
async fn test_polling_client_survives_heartbeat() {
    let server = TestServer::start_with(fast_heartbeat()).await;
    let mut alice = connect(&server, "alice").await;
    recv(&mut alice).await;

    keep_polling(&mut alice, Duration::from_millis(600)).await;

    send(&mut alice, json!({"type": "sendMessage", "text": "still here"})).await;
    assert_eq!(recv(&mut alice).await["text"], "still here");

    server.stop().await;
}
