//! Tribune: real-time relay for chat conversations.
//!
//! Depend on this crate to get the wire protocol, the gateway library and
//! the reconnecting client under one name.

pub mod core {
    pub use tribune_core::*;
}

pub mod gateway {
    pub use tribune_gateway::*;
}

pub mod client {
    pub use tribune_client::*;
}
