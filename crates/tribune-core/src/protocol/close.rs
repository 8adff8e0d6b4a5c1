//! WebSocket close status codes used by the relay (RFC 6455 §7.4.1).

/// Intentional, non-error termination. The only code that does not trigger
/// a client reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Endpoint going away (server shutdown, eviction of a slow consumer).
pub const GOING_AWAY: u16 = 1001;

/// Policy violation.
pub const POLICY_VIOLATION: u16 = 1008;

/// Unexpected server condition.
pub const INTERNAL_ERROR: u16 = 1011;

/// Whether `code` is the transport's normal-closure signal.
pub fn is_normal_closure(code: u16) -> bool {
    code == NORMAL_CLOSURE
}
