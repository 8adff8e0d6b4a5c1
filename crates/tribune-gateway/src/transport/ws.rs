//! WebSocket endpoint: `GET /v1/ws?token=...`.
//!
//! - Authenticate the token before upgrading (failure: HTTP 401, nothing is
//!   registered)
//! - Register the connection, run writer + reader, unregister on exit
//! - Heartbeat ping + idle timeout
//! - Malformed, unknown, oversized, or rate-limited frames are dropped
//!   without closing the session

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use tribune_core::error::RelayError;
use tribune_core::protocol::close::GOING_AWAY;
use tribune_core::Principal;

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::realtime::{Connection, ConnectionId, InboundLimiter};
use crate::transport::codec::{classify, close_frame, Frame};

/// How long a server-initiated close waits for the writer to flush.
const CLOSE_FLUSH_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    let authed = match q.token.as_deref() {
        Some(token) => app.collaborators().auth.authenticate(token).await,
        None => Err(RelayError::AuthFailed),
    };

    let principal = match authed {
        Ok(p) => p,
        Err(e) => {
            app.metrics().ws_upgrades.inc(&[("result", "rejected")]);
            tracing::info!(error = %e, "handshake rejected");
            return ApiError(e).into_response();
        }
    };
    app.metrics().ws_upgrades.inc(&[("result", "accepted")]);

    ws.on_upgrade(move |socket| async move {
        let id = app.registry().next_id();
        let span = tracing::info_span!("session", principal = %principal, conn_id = id);
        run_session(app, principal, id, socket).instrument(span).await;
    })
}

async fn run_session(app: AppState, principal: Principal, id: ConnectionId, socket: WebSocket) {
    let cfg = app.cfg();
    let ping_every = Duration::from_millis(cfg.gateway.ping_interval_ms);
    let idle_timeout = Duration::from_millis(cfg.gateway.idle_timeout_ms);
    let max_frame_bytes = cfg.relay.max_frame_bytes;

    let relay = app.relay();
    let registry = app.registry();
    let metrics = app.metrics();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(cfg.gateway.outbound_queue);
    let (conn, mut close_rx) = Connection::new(id, principal, out_tx);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Single writer: the only task that touches the socket's sink, so frames
    // reach the wire in queue order and never interleave.
    let mut writer = tokio::spawn(
        async move {
            while let Some(m) = out_rx.recv().await {
                let is_close = matches!(m, Message::Close(_));
                if ws_tx.send(m).await.is_err() || is_close {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        }
        .in_current_span(),
    );

    registry.register(conn.clone());
    metrics.ws_sessions_active.inc();
    tracing::info!("session opened");

    let mut limiter = InboundLimiter::new(cfg.relay.inbound_rps, cfg.relay.inbound_burst);
    let mut ping_tick = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    let close_code: Option<u16> = loop {
        tokio::select! {
            _ = &mut writer => {
                tracing::debug!("writer finished");
                break None;
            }

            changed = close_rx.changed() => {
                break match changed {
                    Ok(()) => *close_rx.borrow_and_update(),
                    Err(_) => None,
                };
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break None; };
                last_activity = Instant::now();

                match classify(msg) {
                    Frame::Text(s) => {
                        if s.len() > max_frame_bytes {
                            tracing::debug!(len = s.len(), "oversized frame dropped");
                            continue;
                        }
                        if !limiter.allow() {
                            tracing::debug!("rate limited frame dropped");
                            continue;
                        }
                        match relay.handle_inbound(&conn, &s).await {
                            Ok(report) => tracing::trace!(delivered = report.delivered, evicted = report.evicted, "relayed"),
                            Err(e) => tracing::debug!(error = %e, "inbound frame dropped"),
                        }
                    }
                    Frame::Binary(len) => tracing::debug!(len, "binary frame dropped"),
                    // tungstenite answers pings on its own
                    Frame::Ping | Frame::Pong => {}
                    Frame::Close(code) => {
                        tracing::debug!(?code, "peer closed");
                        break None;
                    }
                }
            }

            _ = ping_tick.tick() => {
                let _ = conn.sender().try_send(Message::Ping(Vec::new()));
            }

            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                tracing::info!("idle timeout");
                break Some(GOING_AWAY);
            }
        }
    };

    registry.unregister(conn.principal(), conn.id());
    metrics.ws_sessions_active.dec();

    if let Some(code) = close_code {
        if conn.sender().try_send(close_frame(code)).is_ok() {
            let _ = tokio::time::timeout(CLOSE_FLUSH_GRACE, &mut writer).await;
        }
    }
    writer.abort();
    tracing::info!(?close_code, "session closed");
}
