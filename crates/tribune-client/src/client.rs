//! Async driver that executes [`ReconnectController`] actions against a real
//! WebSocket.
//!
//! One task owns the socket, the in-flight connect future and the backoff
//! timer. All three sit in the same `select!` as the command channel, so a
//! `logout` is handled as soon as it arrives, even mid-handshake or
//! mid-backoff.
//!
//! Envelopes sent while not connected are dropped. There is no
//! store-and-forward buffer; after a reconnect the caller refetches state
//! over REST.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Sleep};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::Instrument;

use tribune_core::error::{Result, RelayError};
use tribune_core::protocol::{decode_envelope, Envelope};

use crate::config::ClientConfig;
use crate::controller::{Action, ConnectionState, ConnectionStatus, Event, ReconnectController};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connecting = Pin<Box<dyn Future<Output = Result<Socket>> + Send>>;

const COMMAND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;
const CLOSE_FLUSH_GRACE: Duration = Duration::from_secs(1);
/// Reported when the peer closes without a status code.
const NO_STATUS_RECEIVED: u16 = 1005;

enum Command {
    Login(String),
    Logout,
    Retry,
    Send(Envelope),
}

/// Handle to a running client driver.
pub struct RelayClient {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl RelayClient {
    /// Start the driver. Returns the handle plus the stream of envelopes the
    /// relay pushes to this client.
    pub fn spawn(cfg: ClientConfig) -> Result<(Self, mpsc::Receiver<Envelope>)> {
        cfg.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Offline);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

        let driver = Driver {
            controller: ReconnectController::new(cfg.backoff(), cfg.max_attempts),
            cfg,
            token: None,
            socket: None,
            connecting: None,
            backoff: None,
            status: status_tx,
            inbound: inbound_tx,
        };
        let task = tokio::spawn(driver.run(cmd_rx).instrument(tracing::info_span!("relay_client")));

        Ok((
            Self {
                commands: cmd_tx,
                status: status_rx,
                task,
            },
            inbound_rx,
        ))
    }

    /// The auth layer has a session: start connecting with `token`.
    pub async fn login(&self, token: impl Into<String>) -> Result<()> {
        self.command(Command::Login(token.into())).await
    }

    /// Close with 1000 (or cancel a pending reconnect) and stay offline.
    pub async fn logout(&self) -> Result<()> {
        self.command(Command::Logout).await
    }

    /// Try again after the controller gave up.
    pub async fn retry(&self) -> Result<()> {
        self.command(Command::Retry).await
    }

    /// Queue an envelope for the relay; dropped if not connected.
    pub async fn send(&self, env: Envelope) -> Result<()> {
        self.command(Command::Send(env)).await
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop the driver, closing any live socket normally.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "client driver task failed");
        }
    }

    async fn command(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| RelayError::Transport("client driver stopped".into()))
    }
}

struct Driver {
    cfg: ClientConfig,
    controller: ReconnectController,
    token: Option<String>,
    socket: Option<Socket>,
    connecting: Option<Connecting>,
    backoff: Option<Pin<Box<Sleep>>>,
    status: watch::Sender<ConnectionStatus>,
    inbound: mpsc::Sender<Envelope>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },

                res = poll_slot(&mut self.connecting) => {
                    self.connecting = None;
                    match res {
                        Ok(ws) => {
                            self.socket = Some(ws);
                            self.step(Event::Opened).await;
                            tracing::info!("connected");
                        }
                        Err(e) => {
                            tracing::info!(error = %e, "connect failed");
                            self.step(Event::Failed).await;
                        }
                    }
                }

                () = poll_slot(&mut self.backoff) => {
                    self.backoff = None;
                    self.step(Event::BackoffElapsed).await;
                }

                frame = next_frame(&mut self.socket) => self.on_frame(frame).await,
            }
        }

        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(Some(normal_close("client shutdown"))).await;
        }
        self.status.send_replace(ConnectionStatus::Offline);
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Login(token) => {
                self.token = Some(token);
                self.step(Event::Authenticated).await;
            }
            Command::Logout => {
                self.step(Event::LoggedOut).await;
                self.token = None;
            }
            Command::Retry => self.step(Event::Restart).await,
            Command::Send(env) => self.send(env).await,
        }
    }

    async fn send(&mut self, env: Envelope) {
        if self.controller.state() != ConnectionState::Connected {
            tracing::debug!(kind = %env.kind, "not connected; envelope dropped");
            return;
        }
        let Some(ws) = self.socket.as_mut() else {
            return;
        };
        let text = match env.to_json() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "envelope encode failed");
                return;
            }
        };
        if let Err(e) = ws.send(Message::Text(text)).await {
            tracing::info!(error = %e, "send failed");
            self.socket = None;
            self.step(Event::Failed).await;
        }
    }

    async fn on_frame(&mut self, frame: Option<std::result::Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(s))) => match decode_envelope(&s) {
                Ok(env) => {
                    if self.inbound.try_send(env).is_err() {
                        tracing::debug!("inbound queue full or closed; envelope dropped");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "undecodable frame dropped"),
            },
            Some(Ok(Message::Close(frame))) => {
                let code = frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                tracing::info!(code, "closed by relay");
                if let Some(mut ws) = self.socket.take() {
                    // flushes the queued close reply
                    let _ = timeout(CLOSE_FLUSH_GRACE, ws.flush()).await;
                }
                self.step(Event::Closed { code }).await;
            }
            // pings are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::info!(error = %e, "socket error");
                self.socket = None;
                self.step(Event::Failed).await;
            }
            None => {
                tracing::info!("socket ended without close frame");
                self.socket = None;
                self.step(Event::Failed).await;
            }
        }
    }

    async fn step(&mut self, event: Event) {
        let action = self.controller.handle(event);
        tracing::debug!(?event, ?action, state = ?self.controller.state(), "reconnect step");
        if let Some(action) = action {
            self.apply(action).await;
        }

        let status = self.controller.status();
        self.status.send_if_modified(|s| {
            let changed = *s != status;
            *s = status;
            changed
        });
    }

    async fn apply(&mut self, action: Action) {
        match action {
            Action::Connect => {
                let Some(token) = self.token.as_deref() else {
                    tracing::warn!("connect requested without a token");
                    return;
                };
                match self.cfg.url_with_token(token) {
                    Ok(url) => self.connecting = Some(Box::pin(open(url, self.cfg.connect_timeout()))),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot build endpoint url");
                        // surfaces as an ordinary failed attempt
                        self.connecting = Some(Box::pin(std::future::ready(Err(e))));
                    }
                }
            }
            Action::ScheduleReconnect { delay, attempt } => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Action::CancelReconnect => {
                self.backoff = None;
            }
            Action::CloseNormally => {
                self.connecting = None;
                if let Some(mut ws) = self.socket.take() {
                    if let Err(e) = ws.close(Some(normal_close("logout"))).await {
                        tracing::debug!(error = %e, "close on logout failed");
                    }
                }
            }
            Action::GiveUp => {
                self.backoff = None;
                tracing::warn!(attempts = self.controller.attempts(), "reconnect attempts exhausted; offline");
            }
        }
    }
}

/// Token is never logged: it travels in the URL.
async fn open(url: String, wait: Duration) -> Result<Socket> {
    match timeout(wait, connect_async(url.as_str())).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(tungstenite::Error::Http(resp))) if resp.status().as_u16() == 401 => Err(RelayError::AuthFailed),
        Ok(Err(e)) => Err(RelayError::Transport(e.to_string())),
        Err(_) => Err(RelayError::Transport(format!("connect timed out after {wait:?}"))),
    }
}

fn normal_close(reason: &'static str) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }
}

/// Await an optional future; pending forever when the slot is empty.
async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(f) => f.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match socket {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}
