//! Realtime relay: connection registry, typing tracker, dispatch table, and
//! the fan-out engine that ties them to the collaborators.

mod dispatch;
mod limiter;
mod registry;
mod relay;
mod typing;

pub use dispatch::{Dispatcher, Inbound, InboundHandler};
pub use limiter::InboundLimiter;
pub use registry::{Connection, ConnectionId, ConnectionRegistry};
pub use relay::{FanOutReport, MessageRelay, RelaySettings};
pub use typing::TypingTracker;
