//! HTTP client integration tests
//!
//! Runs the client against an in-process axum server on a loopback port

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use keypad_assistant::client::{FailureKind, HttpRemoteClient, RemoteClient};
use keypad_assistant::config::{ServerConfig, Timeouts};
use keypad_assistant::keypad::Digit;
use keypad_assistant::menu::{MenuRegistry, MenuSource};

/// Canned response for one path
#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
}

fn canned(status: u16, body: &'static str) -> Canned {
    Canned {
        status: StatusCode::from_u16(status).unwrap(),
        body,
        delay: Duration::ZERO,
    }
}

/// A request the server received
#[derive(Clone, Debug)]
struct Seen {
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Seen {
    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct TestServer {
    routes: Arc<HashMap<&'static str, Canned>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

async fn record(
    State(server): State<TestServer>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    server.seen.lock().unwrap().push(Seen {
        path: path.clone(),
        headers,
        body,
    });

    let Some(canned) = server.routes.get(path.as_str()).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }
    (canned.status, canned.body).into_response()
}

/// Start a server and return its base URL and request log
async fn serve(routes: Vec<(&'static str, Canned)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = TestServer {
        routes: Arc::new(routes.into_iter().collect()),
        seen: Arc::clone(&seen),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(record).with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), seen)
}

fn client_for(base_url: &str) -> HttpRemoteClient {
    let config = ServerConfig {
        base_url: format!("{base_url}/"),
        ..ServerConfig::default()
    };
    HttpRemoteClient::new(&config).unwrap()
}

fn digit(d: u8) -> Digit {
    Digit::new(d).unwrap()
}

#[tokio::test]
async fn test_fetch_menu() {
    let (url, seen) = serve(vec![(
        "/menu",
        canned(
            200,
            r#"{"items": {"1": {"label": "Lights", "type": "instant"}, "2": {"type": "voice", "prompt": "Say it"}}}"#,
        ),
    )])
    .await;

    let descriptor = client_for(&url).fetch_menu().await.unwrap();
    let menu = MenuRegistry::from_descriptor(descriptor);

    assert_eq!(menu.source(), Some(MenuSource::Remote));
    assert_eq!(menu.render(), "1: Lights\n2: Action 2\n0: Exit");
    assert_eq!(menu.get(digit(2)).unwrap().prompt.as_deref(), Some("Say it"));
    assert_eq!(seen.lock().unwrap()[0].path, "/menu");
}

#[tokio::test]
async fn test_fetch_menu_requires_200() {
    let (url, _) = serve(vec![("/menu", canned(204, ""))]).await;

    let failure = client_for(&url).fetch_menu().await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Network);
    assert_eq!(failure.reason, "Server 204");
}

#[tokio::test]
async fn test_fetch_menu_malformed() {
    let (url, _) = serve(vec![("/menu", canned(200, "not json"))]).await;

    let failure = client_for(&url).fetch_menu().await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Parse);
}

#[tokio::test]
async fn test_fetch_menu_times_out() {
    let (url, _) = serve(vec![(
        "/menu",
        Canned {
            delay: Duration::from_secs(2),
            ..canned(200, r#"{"items": {}}"#)
        },
    )])
    .await;

    let config = ServerConfig {
        base_url: url,
        menu_timeouts: Timeouts {
            connect: Duration::from_secs(1),
            read: Duration::from_millis(200),
        },
        ..ServerConfig::default()
    };
    let client = HttpRemoteClient::new(&config).unwrap();

    let failure = client.fetch_menu().await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Network);
    assert_eq!(failure.reason, "Timed out");
}

#[tokio::test]
async fn test_unreachable_server_is_network_failure() {
    let client = client_for("http://127.0.0.1:1");
    let failure = client.chat("hello").await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Network);
}

#[tokio::test]
async fn test_execute_action_with_voice_input() {
    let (url, seen) = serve(vec![(
        "/action",
        canned(200, r#"{"response": "Reminder set.\n[1] Change time"}"#),
    )])
    .await;

    let reply = client_for(&url)
        .execute_action(digit(6), Some("call mom at noon"))
        .await
        .unwrap();
    assert_eq!(reply, "Reminder set.\n[1] Change time");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].path, "/action");
    assert_eq!(
        seen[0].json(),
        serde_json::json!({"action": "6", "voice_input": "call mom at noon"})
    );
}

#[tokio::test]
async fn test_execute_action_omits_missing_voice_input() {
    let (url, seen) = serve(vec![("/action", canned(200, r#"{"response": "ok"}"#))]).await;

    client_for(&url)
        .execute_action(digit(1), None)
        .await
        .unwrap();
    assert_eq!(
        seen.lock().unwrap()[0].json(),
        serde_json::json!({"action": "1"})
    );
}

#[tokio::test]
async fn test_execute_action_server_error() {
    let (url, _) = serve(vec![("/action", canned(500, "boom"))]).await;

    let failure = client_for(&url)
        .execute_action(digit(2), None)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Network);
    assert_eq!(failure.reason, "Server error: 500");
}

#[tokio::test]
async fn test_chat_body_variants() {
    let (url, seen) = serve(vec![("/chat", canned(200, r#"{"status": "queued"}"#))]).await;

    let reply = client_for(&url).chat("what's next").await.unwrap();
    assert_eq!(reply, r#"{"status": "queued"}"#);
    assert_eq!(
        seen.lock().unwrap()[0].json(),
        serde_json::json!({"text": "what's next"})
    );

    let (url, _) = serve(vec![("/chat", canned(200, "<html>proxy error</html>"))]).await;
    let failure = client_for(&url).chat("hi").await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Parse);
}

#[tokio::test]
async fn test_transcribe_sends_raw_audio() {
    let (url, seen) = serve(vec![(
        "/audio",
        canned(200, r#"{"transcript": "  turn it up  "}"#),
    )])
    .await;

    let transcript = client_for(&url)
        .transcribe(b"RIFFdata".to_vec())
        .await
        .unwrap();
    assert_eq!(transcript, "turn it up");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].path, "/audio");
    assert_eq!(seen[0].header("content-type"), Some("audio/wav"));
    assert_eq!(seen[0].header("x-transcribe-only"), Some("true"));
    assert_eq!(&seen[0].body[..], b"RIFFdata");
}

#[tokio::test]
async fn test_transcribe_missing_field_is_empty() {
    let (url, _) = serve(vec![("/audio", canned(200, "{}"))]).await;

    let transcript = client_for(&url).transcribe(vec![1, 2, 3]).await.unwrap();
    assert_eq!(transcript, "");
}

#[tokio::test]
async fn test_transcribe_empty_audio_is_not_sent() {
    let (url, seen) = serve(vec![("/audio", canned(200, "{}"))]).await;

    let failure = client_for(&url).transcribe(Vec::new()).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::Precondition);
    assert_eq!(failure.reason, "No audio");
    assert!(seen.lock().unwrap().is_empty());
}
