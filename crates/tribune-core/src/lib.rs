//! Tribune core: transport-agnostic wire protocol, identifiers, and errors.
//!
//! This crate defines the envelope contract shared by the relay gateway and
//! the client-side reconnect driver. It carries no transport or runtime
//! dependencies so both sides can depend on it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Every fallible
//! path surfaces as `RelayError`/`Result`, so a hostile frame can never take
//! down a session.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod error;
pub mod ids;
pub mod protocol;

/// Shared result type.
pub use error::{Result, RelayError};
pub use ids::{ConversationId, Principal};
