//! Shared error type across tribune crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed envelope.
    BadRequest,
    /// Envelope `type` outside the closed enumeration.
    UnknownType,
    /// Auth failed.
    AuthFailed,
    /// Principal may not act on the target.
    NotAllowed,
    /// An external collaborator failed.
    Upstream,
    /// Socket-level failure.
    Transport,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnknownType => "UNKNOWN_TYPE",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::Upstream => "UPSTREAM",
            ClientCode::Transport => "TRANSPORT",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by core, gateway, and client.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown envelope type: {0}")]
    UnknownType(String),
    #[error("auth failed")]
    AuthFailed,
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("collaborator failed: {0}")]
    Collaborator(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RelayError::BadRequest(_) => ClientCode::BadRequest,
            RelayError::UnknownType(_) => ClientCode::UnknownType,
            RelayError::AuthFailed => ClientCode::AuthFailed,
            RelayError::NotAllowed(_) => ClientCode::NotAllowed,
            RelayError::Collaborator(_) => ClientCode::Upstream,
            RelayError::Transport(_) => ClientCode::Transport,
            RelayError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            RelayError::Internal(_) => ClientCode::Internal,
        }
    }
}
