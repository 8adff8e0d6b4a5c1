//! Transport layer (WebSocket).
//!
//! Authenticates the handshake, then runs one session per socket: a writer
//! task draining the connection's queue and a reader loop feeding the relay.

pub mod codec;
pub mod ws;
