//! Reconnect state machine.
//!
//! ```text
//! Disconnected --Authenticated--> Connecting --Opened--> Connected
//!      ^                              |  ^                   |
//!      |  GiveUp (attempts exhausted) |  | BackoffElapsed    | Closed(!1000) | Failed
//!      +------------------------------+--+---- Backoff <-----+
//!
//! Connected --Closed(1000)--> Disconnected
//! any       --LoggedOut-----> Disconnected
//! ```
//!
//! The controller never performs I/O or sleeps. It returns an [`Action`] and
//! the driver executes it, so cancellation is just dropping a timer.

use std::time::Duration;

use tribune_core::protocol::close::is_normal_closure;

use crate::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

/// What the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The auth collaborator reports a session.
    Authenticated,
    /// Handshake completed.
    Opened,
    /// Peer closed the socket.
    Closed { code: u16 },
    /// Connect failed or the socket errored.
    Failed,
    BackoffElapsed,
    /// Explicit logout or auth loss.
    LoggedOut,
    /// User asked to try again after giving up.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    ScheduleReconnect { delay: Duration, attempt: u32 },
    CancelReconnect,
    /// Send close 1000 and drop the socket.
    CloseNormally,
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ReconnectController {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    authenticated: bool,
    exhausted: bool,
    backoff: Backoff,
}

impl ReconnectController {
    pub fn new(backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            authenticated: false,
            exhausted: false,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ConnectionState::Connected => ConnectionStatus::Connected,
            ConnectionState::Connecting | ConnectionState::Backoff => ConnectionStatus::Connecting,
            ConnectionState::Disconnected => ConnectionStatus::Offline,
        }
    }

    /// Failed attempts since the last successful handshake.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True after `GiveUp` until the next `Authenticated` or `Restart`.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn handle(&mut self, event: Event) -> Option<Action> {
        use ConnectionState as S;

        match (self.state, event) {
            (S::Disconnected, Event::Authenticated) => {
                self.authenticated = true;
                Some(self.begin())
            }
            (_, Event::Authenticated) => {
                self.authenticated = true;
                None
            }

            (S::Disconnected, Event::Restart) if self.authenticated => Some(self.begin()),

            (S::Connecting, Event::Opened) => {
                self.state = S::Connected;
                self.attempts = 0;
                None
            }

            (S::Connected, Event::Closed { code }) if is_normal_closure(code) => {
                self.state = S::Disconnected;
                self.attempts = 0;
                None
            }
            (S::Connected | S::Connecting, Event::Closed { .. } | Event::Failed) => Some(self.fail()),

            (S::Backoff, Event::BackoffElapsed) => {
                self.state = S::Connecting;
                Some(Action::Connect)
            }

            (state, Event::LoggedOut) => {
                self.authenticated = false;
                self.exhausted = false;
                self.attempts = 0;
                self.state = S::Disconnected;
                match state {
                    S::Connected | S::Connecting => Some(Action::CloseNormally),
                    S::Backoff => Some(Action::CancelReconnect),
                    S::Disconnected => None,
                }
            }

            // stale timer or socket event
            _ => None,
        }
    }

    fn begin(&mut self) -> Action {
        self.state = ConnectionState::Connecting;
        self.attempts = 0;
        self.exhausted = false;
        Action::Connect
    }

    fn fail(&mut self) -> Action {
        if self.attempts >= self.max_attempts {
            self.state = ConnectionState::Disconnected;
            self.exhausted = true;
            return Action::GiveUp;
        }
        self.attempts += 1;
        self.state = ConnectionState::Backoff;
        Action::ScheduleReconnect {
            delay: self.backoff.delay(self.attempts),
            attempt: self.attempts,
        }
    }
}
