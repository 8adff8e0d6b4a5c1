//! Real sockets: axum server on an ephemeral port, tungstenite clients.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tribune_core::protocol::close::GOING_AWAY;
use tribune_core::protocol::{decode_envelope, Envelope, EnvelopeType};
use tribune_core::Principal;
use tribune_gateway::app_state::AppState;
use tribune_gateway::config::{self, GatewayConfig};
use tribune_gateway::router::build_router;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONFIG: &str = r#"
version: 1
gateway:
  listen: "127.0.0.1:0"
relay:
  typing_timeout_ms: 200
  sweep_interval_ms: 50
auth:
  mode: static
  tokens: { t-alice: alice, t-bob: bob, t-carol: carol }
directory:
  mode: memory
  conversations:
    c1: [alice, bob]
internal:
  publish_token: pub-secret
"#;

async fn start() -> (SocketAddr, AppState) {
    start_with(|_| {}).await
}

/// Like [`start`], with `tweak` applied after parsing so tests can use limits
/// below the validated ranges.
async fn start_with(tweak: impl FnOnce(&mut GatewayConfig)) -> (SocketAddr, AppState) {
    let mut cfg = config::load_from_str(CONFIG).unwrap();
    tweak(&mut cfg);
    let app = AppState::new(cfg).unwrap();
    app.relay().spawn_typing_sweeper(app.cfg().relay.sweep_interval());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(app.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, app)
}

async fn join(addr: SocketAddr, token: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/v1/ws?token={token}")).await.unwrap();
    ws
}

/// Upgrade completes before the session registers; wait for it.
async fn wait_for_connections(app: &AppState, n: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while app.registry().connection_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions did not register");
}

async fn next_frame(ws: &mut Client) -> Message {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("no frame within 2s")
            .expect("stream ended")
            .unwrap();
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn next_envelope(ws: &mut Client) -> Envelope {
    match next_frame(ws).await {
        Message::Text(s) => decode_envelope(&s).unwrap(),
        other => panic!("expected text, got {other:?}"),
    }
}

async fn assert_silent(ws: &mut Client, for_ms: u64) {
    if let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_millis(for_ms), ws.next()).await {
        assert!(matches!(msg, Message::Ping(_)), "unexpected frame {msg:?}");
    }
}

#[tokio::test]
async fn handshake_requires_valid_token() {
    let (addr, app) = start().await;

    for url in [
        format!("ws://{addr}/v1/ws?token=nope"),
        format!("ws://{addr}/v1/ws"),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
            other => panic!("expected HTTP 401, got {:?}", other.map(|(_, r)| r.status())),
        }
    }
    assert_eq!(app.registry().connection_count(), 0);
    assert_eq!(app.metrics().ws_upgrades.get(&[("result", "rejected")]), 2);
}

#[tokio::test]
async fn publish_fans_out_to_members_only() {
    let (addr, app) = start().await;
    let mut alice = join(addr, "t-alice").await;
    let mut bob = join(addr, "t-bob").await;
    let mut carol = join(addr, "t-carol").await;
    wait_for_connections(&app, 3).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v1/internal/conversations/c1/publish"))
        .bearer_auth("pub-secret")
        .json(&serde_json::json!({ "message": { "id": "m1", "body": "hi" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let report: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(report["delivered"], 2);

    for ws in [&mut alice, &mut bob] {
        let env = next_envelope(ws).await;
        assert_eq!(env.kind, EnvelopeType::NewMessage);
        assert_eq!(env.conversation_id.as_ref().map(|c| c.as_str()), Some("c1"));
        let body: serde_json::Value = serde_json::from_str(env.message.unwrap().get()).unwrap();
        assert_eq!(body["id"], "m1");
    }
    assert_silent(&mut carol, 150).await;
}

#[tokio::test]
async fn publish_rejects_bad_bearer() {
    let (addr, _app) = start().await;
    let http = reqwest::Client::new();
    let url = format!("http://{addr}/v1/internal/conversations/c1/publish");

    let no_auth = http.post(&url).json(&serde_json::json!({})).send().await.unwrap();
    assert_eq!(no_auth.status().as_u16(), 401);

    let wrong = http
        .post(&url)
        .bearer_auth("guess")
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 401);

    let extra = http
        .post(&url)
        .bearer_auth("pub-secret")
        .json(&serde_json::json!({ "conversation": "c2" }))
        .send()
        .await
        .unwrap();
    assert!(extra.status().is_client_error());
}

#[tokio::test]
async fn typing_expires_into_stop_typing() {
    let (addr, app) = start().await;
    let mut alice = join(addr, "t-alice").await;
    let mut bob = join(addr, "t-bob").await;
    wait_for_connections(&app, 2).await;

    alice
        .send(Message::Text(r#"{"type":"typing","conversation_id":"c1"}"#.into()))
        .await
        .unwrap();

    let typing = next_envelope(&mut bob).await;
    assert_eq!(typing.kind, EnvelopeType::Typing);
    assert_eq!(typing.user_id, Some(Principal::from("alice")));

    // window 200ms, sweep every 50ms
    let stop = next_envelope(&mut bob).await;
    assert_eq!(stop.kind, EnvelopeType::StopTyping);
    assert_eq!(stop.user_id, Some(Principal::from("alice")));
    assert!(app.relay().typing().is_empty());
}

#[tokio::test]
async fn bad_frames_do_not_close_the_session() {
    let (addr, app) = start().await;
    let mut alice = join(addr, "t-alice").await;
    let mut bob = join(addr, "t-bob").await;
    wait_for_connections(&app, 2).await;

    for junk in [
        "not json",
        r#"{"type":"reaction_added","conversation_id":"c1"}"#,
        r#"{"type":"new_message","conversation_id":"c1"}"#,
    ] {
        alice.send(Message::Text(junk.into())).await.unwrap();
    }
    alice.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    alice
        .send(Message::Text(r#"{"type":"stop_typing","conversation_id":"c1"}"#.into()))
        .await
        .unwrap();

    let env = next_envelope(&mut bob).await;
    assert_eq!(env.kind, EnvelopeType::StopTyping);
    assert_eq!(app.registry().connection_count(), 2);
}

#[tokio::test]
async fn oversized_frame_is_dropped_and_session_keeps_relaying() {
    let (addr, app) = start_with(|cfg| cfg.relay.max_frame_bytes = 128).await;
    let mut alice = join(addr, "t-alice").await;
    let mut bob = join(addr, "t-bob").await;
    wait_for_connections(&app, 2).await;

    // valid JSON, padded past the limit with whitespace
    let padded = format!(r#"{{"type":"typing",{}"conversation_id":"c1"}}"#, " ".repeat(256));
    alice.send(Message::Text(padded)).await.unwrap();
    alice
        .send(Message::Text(r#"{"type":"stop_typing","conversation_id":"c1"}"#.into()))
        .await
        .unwrap();

    let env = next_envelope(&mut bob).await;
    assert_eq!(env.kind, EnvelopeType::StopTyping);
    assert!(app.relay().typing().is_empty());
    assert_eq!(app.registry().connection_count(), 2);
}

#[tokio::test]
async fn frames_beyond_the_burst_are_dropped_without_closing() {
    let (addr, app) = start_with(|cfg| {
        cfg.relay.inbound_rps = 1;
        cfg.relay.inbound_burst = 3;
    })
    .await;
    let mut alice = join(addr, "t-alice").await;
    let mut bob = join(addr, "t-bob").await;
    wait_for_connections(&app, 2).await;

    for _ in 0..6 {
        alice
            .send(Message::Text(r#"{"type":"stop_typing","conversation_id":"c1"}"#.into()))
            .await
            .unwrap();
    }

    for _ in 0..3 {
        assert_eq!(next_envelope(&mut bob).await.kind, EnvelopeType::StopTyping);
    }
    assert_silent(&mut bob, 300).await;
    assert_eq!(app.registry().connection_count(), 2);
}

#[tokio::test]
async fn silent_client_is_closed_with_going_away() {
    let (addr, app) = start_with(|cfg| cfg.gateway.idle_timeout_ms = 300).await;
    let mut alice = join(addr, "t-alice").await;
    wait_for_connections(&app, 1).await;

    match next_frame(&mut alice).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), GOING_AWAY),
        other => panic!("expected close frame, got {other:?}"),
    }
    tokio::time::timeout(Duration::from_secs(2), async {
        while app.registry().connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session did not unregister");
}

#[tokio::test]
async fn shutdown_closes_sessions_with_going_away() {
    let (addr, app) = start().await;
    let mut alice = join(addr, "t-alice").await;
    wait_for_connections(&app, 1).await;

    app.registry().close_all(GOING_AWAY);

    match next_frame(&mut alice).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), GOING_AWAY),
        other => panic!("expected close frame, got {other:?}"),
    }
    tokio::time::timeout(Duration::from_secs(2), async {
        while app.registry().connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session did not unregister");
}

#[tokio::test]
async fn ops_endpoints_report_state() {
    let (addr, app) = start().await;
    let _alice = join(addr, "t-alice").await;
    wait_for_connections(&app, 1).await;
    let http = reqwest::Client::new();

    let health = http.get(format!("http://{addr}/healthz")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let metrics = http
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("tribune_connections 1"));
    assert!(metrics.contains("tribune_ws_sessions_active 1"));

    app.metrics().set_draining();
    let ready = http.get(format!("http://{addr}/readyz")).send().await.unwrap();
    assert_eq!(ready.status().as_u16(), 503);
}
