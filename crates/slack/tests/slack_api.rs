use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use checksweep_core::config::AppConfig;
use checksweep_core::domain::message::{ChannelId, MessageIdentity, UserId};
use checksweep_core::errors::ApiError;
use checksweep_core::platform::MessagingClient;
use checksweep_slack::events::SlackEvent;
use checksweep_slack::socket::SocketTransport;
use checksweep_slack::transport::SlackSocketTransport;
use checksweep_slack::web::{SlackWebClient, TokenKind};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
struct RecordedCall {
    method: String,
    authorization: String,
    params: HashMap<String, String>,
}

#[derive(Default)]
struct FakeSlack {
    socket_url: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeSlack {
    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

async fn handle(
    State(slack): State<Arc<FakeSlack>>,
    Path(method): Path<String>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    if let Ok(mut calls) = slack.calls.lock() {
        calls.push(RecordedCall { method: method.clone(), authorization, params: params.clone() });
    }

    let body = match method.as_str() {
        "conversations.list" => match params.get("cursor").map(String::as_str) {
            None => json!({
                "ok": true,
                "channels": [{"id": "C1", "is_member": true}, {"id": "C2", "is_member": false}],
                "response_metadata": {"next_cursor": "page-2"}
            }),
            Some(_) => json!({
                "ok": true,
                "channels": [{"id": "C3", "is_member": true}],
                "response_metadata": {"next_cursor": ""}
            }),
        },
        "reactions.get" if params.get("timestamp").map(String::as_str) == Some("404.0") => {
            json!({"ok": false, "error": "message_not_found"})
        }
        "reactions.get" => json!({
            "ok": true,
            "type": "message",
            "message": {"ts": "1.0", "reactions": [{"name": "white_check_mark", "count": 1}]}
        }),
        "chat.delete" => json!({"ok": true, "channel": "C1", "ts": "1.0"}),
        "users.info" => {
            return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "30")], "slow down")
                .into_response();
        }
        "auth.test" => json!({"ok": true, "user_id": "U0", "user": "checksweep", "team": "Acme"}),
        "apps.connections.open" => json!({"ok": true, "url": slack.socket_url}),
        _ => json!({"ok": false, "error": "unknown_method"}),
    };
    Json(body).into_response()
}

async fn fake_slack(socket_url: String) -> (Arc<FakeSlack>, SlackWebClient) {
    let slack = Arc::new(FakeSlack { socket_url, ..FakeSlack::default() });
    let router = Router::new().route("/api/{method}", post(handle)).with_state(slack.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake slack");
    let address = listener.local_addr().expect("fake slack address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let mut config = AppConfig::default().slack;
    config.api_base_url = format!("http://{address}/api");
    config.app_token = "xapp-app".to_owned().into();
    config.bot_token = "xoxb-bot".to_owned().into();
    config.user_token = "xoxp-user".to_owned().into();
    (slack, SlackWebClient::new(&config).expect("client"))
}

const HELLO: &str = r#"{"type":"hello","num_connections":1}"#;
const ENVELOPE: &str = r#"{
    "envelope_id": "env-1",
    "type": "events_api",
    "payload": {"event": {
        "type": "reaction_added", "user": "U2", "reaction": "white_check_mark", "item_user": "U1",
        "item": {"type": "message", "channel": "C1", "ts": "1.0"}
    }}
}"#;
const DISCONNECT: &str = r#"{"type":"disconnect","reason":"refresh_requested"}"#;

async fn socket_server() -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind socket server");
    let url = format!("ws://{}", listener.local_addr().expect("socket address"));
    let (ack_tx, ack_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        socket.send(Message::Text(HELLO.to_owned())).await.expect("send hello");
        socket.send(Message::Text(ENVELOPE.to_owned())).await.expect("send envelope");
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let _ = ack_tx.send(text);
                break;
            }
        }
        socket.send(Message::Text(DISCONNECT.to_owned())).await.expect("send disconnect");
        while let Some(Ok(_)) = socket.next().await {}
    });

    (url, ack_rx)
}

#[tokio::test]
async fn member_channels_follow_cursor_with_bot_token() {
    let (slack, client) = fake_slack(String::new()).await;

    let channels = client.list_member_channels().await.expect("channels");

    assert_eq!(channels, vec![ChannelId("C1".to_owned()), ChannelId("C3".to_owned())]);
    let calls = slack.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.authorization == "Bearer xoxb-bot"));
    assert_eq!(
        calls[0].params.get("types").map(String::as_str),
        Some("public_channel,private_channel")
    );
    assert_eq!(calls[1].params.get("cursor").map(String::as_str), Some("page-2"));
}

#[tokio::test]
async fn reactions_and_delete_use_user_token() {
    let (slack, client) = fake_slack(String::new()).await;
    let identity = MessageIdentity::new("C1", "1.0");

    let reactions = client.reactions(&identity).await.expect("reactions");
    client.delete_message(&identity).await.expect("delete");

    assert_eq!(reactions, vec!["white_check_mark".to_owned()]);
    let calls = slack.calls();
    assert_eq!(calls[0].method, "reactions.get");
    assert_eq!(calls[1].method, "chat.delete");
    assert_eq!(calls[1].params.get("ts").map(String::as_str), Some("1.0"));
    assert!(calls.iter().all(|call| call.authorization == "Bearer xoxp-user"));
}

#[tokio::test]
async fn missing_message_maps_to_not_found() {
    let (_, client) = fake_slack(String::new()).await;

    let missing = MessageIdentity::new("C1", "404.0");
    let error = client.reactions(&missing).await.expect_err("missing");

    assert!(error.is_not_found());
    assert_eq!(error.method(), "reactions.get");
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let (_, client) = fake_slack(String::new()).await;

    let error = client.user_display_name(&UserId("U1".to_owned())).await.expect_err("limited");

    assert_eq!(
        error,
        ApiError::RateLimited { method: "users.info".to_owned(), retry_after_secs: Some(30) }
    );
}

#[tokio::test]
async fn auth_test_reports_identity() {
    let (_, client) = fake_slack(String::new()).await;

    let identity = client.auth_test(TokenKind::Bot).await.expect("auth.test");

    assert_eq!(identity.user, "checksweep");
    assert_eq!(identity.team, "Acme");
}

#[tokio::test]
async fn socket_transport_acknowledges_and_ends_on_disconnect() {
    let (socket_url, ack) = socket_server().await;
    let (slack, client) = fake_slack(socket_url).await;
    let transport = SlackSocketTransport::new(Arc::new(client));

    transport.connect().await.expect("connect");
    let envelope = transport.next_envelope().await.expect("read").expect("envelope");
    transport.acknowledge(&envelope.envelope_id).await.expect("ack");
    let after_disconnect = transport.next_envelope().await.expect("read");
    transport.disconnect().await.expect("disconnect");

    assert_eq!(envelope.envelope_id, "env-1");
    assert!(matches!(
        envelope.event,
        SlackEvent::ReactionAdded(ref event) if event.message_ts == "1.0"
    ));
    assert_eq!(after_disconnect, None);
    let ack: serde_json::Value =
        serde_json::from_str(&ack.await.expect("ack received")).expect("ack json");
    assert_eq!(ack, json!({"envelope_id": "env-1"}));
    assert_eq!(slack.calls()[0].authorization, "Bearer xapp-app");
}
