//! Wire protocol (JSON envelopes over a duplex text channel).
//!
//! Decoding is panic-free: malformed input and unknown types are reported as
//! `RelayError` so callers can log and drop without closing the session.

pub mod close;
pub mod envelope;

pub use envelope::{decode_envelope, Envelope, EnvelopeType};
