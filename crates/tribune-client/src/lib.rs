//! Tribune client: reconnect policy and the async WebSocket driver.
//!
//! [`ReconnectController`] is a pure state machine; [`RelayClient`] owns the
//! socket and executes the controller's actions with tokio timers, so a
//! logout always preempts a pending reconnect.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod backoff;
pub mod client;
pub mod config;
pub mod controller;

pub use backoff::Backoff;
pub use client::RelayClient;
pub use config::ClientConfig;
pub use controller::{Action, ConnectionState, ConnectionStatus, Event, ReconnectController};
