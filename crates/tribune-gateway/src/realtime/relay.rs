use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};

use tribune_core::error::{Result, RelayError};
use tribune_core::protocol::close::GOING_AWAY;
use tribune_core::protocol::{decode_envelope, Envelope, EnvelopeType};
use tribune_core::{ConversationId, Principal};

use crate::collab::{Collaborators, ConversationDirectory, ReadReceipts};
use crate::config::EchoPolicy;
use crate::obs::RelayMetrics;

use super::dispatch::{Dispatcher, Inbound};
use super::registry::{Connection, ConnectionId, ConnectionRegistry};
use super::typing::TypingTracker;

/// Policy knobs for the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub echo: EchoPolicy,
    pub typing_window: Duration,
    pub write_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            echo: EchoPolicy::All,
            typing_window: Duration::from_secs(3),
            write_timeout: Duration::from_millis(1500),
        }
    }
}

/// Outcome of one fan-out. Never surfaced to the sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// Who is left out of a fan-out.
enum Exclude<'a> {
    Nobody,
    Connection(ConnectionId),
    Principal(&'a Principal),
}

impl Exclude<'_> {
    fn skips_principal(&self, p: &Principal) -> bool {
        matches!(self, Exclude::Principal(x) if *x == p)
    }
    fn skips_connection(&self, id: ConnectionId) -> bool {
        matches!(self, Exclude::Connection(x) if *x == id)
    }
}

/// Validates inbound envelopes and fans envelopes out to member connections.
pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    typing: TypingTracker,
    directory: Arc<dyn ConversationDirectory>,
    receipts: Arc<dyn ReadReceipts>,
    dispatcher: Dispatcher,
    settings: RelaySettings,
    metrics: Arc<RelayMetrics>,
}

impl MessageRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        collab: &Collaborators,
        settings: RelaySettings,
        metrics: Arc<RelayMetrics>,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            typing: TypingTracker::new(settings.typing_window),
            directory: Arc::clone(&collab.directory),
            receipts: Arc::clone(&collab.receipts),
            dispatcher: Dispatcher::with_builtin()?,
            settings,
            metrics,
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    pub(crate) fn receipts(&self) -> &dyn ReadReceipts {
        self.receipts.as_ref()
    }

    /// Handle one raw text frame from `origin`.
    ///
    /// Any error means the frame was dropped; the caller logs it and keeps
    /// the connection open.
    pub async fn handle_inbound(&self, origin: &Connection, raw: &str) -> Result<FanOutReport> {
        let env = match decode_envelope(raw) {
            Ok(env) => env,
            Err(e) => {
                let outcome = match e {
                    RelayError::UnknownType(_) => "unknown_type",
                    _ => "malformed",
                };
                self.metrics
                    .inbound_frames
                    .inc(&[("type", "invalid"), ("outcome", outcome)]);
                return Err(e);
            }
        };

        let kind = env.kind;
        let res = self.route_inbound(origin, env).await;
        let outcome = if res.is_ok() { "relayed" } else { "dropped" };
        self.metrics
            .inbound_frames
            .inc(&[("type", kind.as_str()), ("outcome", outcome)]);
        res
    }

    async fn route_inbound(&self, origin: &Connection, mut env: Envelope) -> Result<FanOutReport> {
        let handler = self.dispatcher.get(env.kind)?;
        let conversation = env
            .conversation_id
            .clone()
            .ok_or_else(|| RelayError::BadRequest(format!("{} requires conversation_id", env.kind)))?;

        let members = self.directory.members(&conversation).await?;
        if !members.contains(origin.principal()) {
            return Err(RelayError::NotAllowed(format!(
                "{} is not a member of {conversation}",
                origin.principal()
            )));
        }

        // Never trust client identity or clock.
        env.user_id = Some(origin.principal().clone());
        let env = env.stamped();

        handler
            .handle(
                self,
                Inbound {
                    origin,
                    conversation,
                    envelope: env,
                    members,
                },
            )
            .await
    }

    /// Fan an inbound envelope out to its conversation, honouring the echo
    /// policy relative to the origin connection.
    pub(crate) async fn fan_out_inbound(&self, inbound: Inbound<'_>) -> Result<FanOutReport> {
        let exclude = match self.settings.echo {
            EchoPolicy::All => Exclude::Nobody,
            EchoPolicy::ExceptOrigin => Exclude::Connection(inbound.origin.id()),
            EchoPolicy::ExceptPrincipal => Exclude::Principal(inbound.origin.principal()),
        };
        self.fan_out(&inbound.members, &inbound.envelope, exclude).await
    }

    /// Server-initiated delivery (the REST boundary calls this after a
    /// message is persisted). The only path that emits `new_message`.
    pub async fn publish(&self, conversation: &ConversationId, env: Envelope) -> Result<FanOutReport> {
        let env = env.with_conversation(conversation.clone()).stamped();
        let members = self.directory.members(conversation).await?;
        self.fan_out(&members, &env, Exclude::Nobody).await
    }

    /// Expire stale typing entries and emit one implicit `stop_typing` each.
    /// Returns how many stops were emitted.
    ///
    /// An entry is removed before its membership lookup. If the lookup fails
    /// the stop is not sent and receivers fall back to their own display
    /// timeout. If the principal typed again while the lookup was in flight
    /// the stop is skipped, so it never lands after the fresh `typing`.
    pub async fn sweep_typing(&self) -> usize {
        let mut emitted = 0;

        for (conversation, principal) in self.typing.sweep_expired(Instant::now()) {
            let members = match self.directory.members(&conversation).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(%conversation, %principal, error = %e, "implicit stop_typing: membership lookup failed");
                    continue;
                }
            };
            if self.typing.is_typing(&conversation, &principal) {
                tracing::debug!(%conversation, %principal, "typing refreshed during sweep; stop skipped");
                continue;
            }

            let env = Envelope::new(EnvelopeType::StopTyping)
                .with_conversation(conversation.clone())
                .with_user(principal.clone())
                .stamped();

            let exclude = match self.settings.echo {
                EchoPolicy::ExceptPrincipal => Exclude::Principal(&principal),
                // no origin connection on the timer path
                _ => Exclude::Nobody,
            };

            self.metrics.typing_expired.inc(&[]);
            emitted += 1;
            if let Err(e) = self.fan_out(&members, &env, exclude).await {
                tracing::warn!(%conversation, %principal, error = %e, "implicit stop_typing fan-out failed");
            }
        }
        emitted
    }

    /// Run `sweep_typing` on a fixed interval until the task is aborted.
    pub fn spawn_typing_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let n = relay.sweep_typing().await;
                if n > 0 {
                    tracing::debug!(expired = n, "typing sweep");
                }
            }
        })
    }

    async fn fan_out(&self, members: &[Principal], env: &Envelope, exclude: Exclude<'_>) -> Result<FanOutReport> {
        let started = Instant::now();
        let text = env.to_json()?;

        let mut members: Vec<&Principal> = members.iter().filter(|p| !exclude.skips_principal(p)).collect();
        members.sort();
        members.dedup();

        let wait = self.settings.write_timeout;
        let mut sends = FuturesUnordered::new();
        for conn in members
            .into_iter()
            .flat_map(|p| self.registry.connections_for(p))
            .filter(|c| !exclude.skips_connection(c.id()))
        {
            let msg = Message::Text(text.clone());
            sends.push(async move {
                let ok = deliver(&conn, msg, wait).await;
                (conn, ok)
            });
        }

        let mut report = FanOutReport::default();
        while let Some((conn, ok)) = sends.next().await {
            if ok {
                report.delivered += 1;
            } else {
                self.evict(&conn);
                report.evicted += 1;
            }
        }

        self.metrics
            .fanout_deliveries
            .add(&[("type", env.kind.as_str())], report.delivered as u64);
        self.metrics.fanout_evictions.add(&[], report.evicted as u64);
        self.metrics.fanout_duration.observe(started.elapsed());
        Ok(report)
    }

    /// Drop a connection whose queue is closed or stuck.
    fn evict(&self, conn: &Connection) {
        if self.registry.unregister(conn.principal(), conn.id()) {
            tracing::warn!(principal = %conn.principal(), conn_id = conn.id(), "evicting connection after failed write");
        }
        conn.close(GOING_AWAY);
    }
}

/// Queue one frame. A full queue gets `wait` to drain; a closed queue fails
/// at once.
async fn deliver(conn: &Connection, msg: Message, wait: Duration) -> bool {
    match conn.sender().try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Closed(_)) => false,
        Err(TrySendError::Full(msg)) => matches!(timeout(wait, conn.sender().send(msg)).await, Ok(Ok(()))),
    }
}
