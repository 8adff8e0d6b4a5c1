//! Tribune relay gateway library entry.
//!
//! Wires the WebSocket transport, connection registry, message relay, typing
//! tracker, and external collaborators into one service. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod collab;
pub mod config;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod transport;
