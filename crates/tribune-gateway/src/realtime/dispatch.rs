use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use tribune_core::error::{Result, RelayError};
use tribune_core::protocol::{Envelope, EnvelopeType};
use tribune_core::{ConversationId, Principal};

use super::registry::Connection;
use super::relay::{FanOutReport, MessageRelay};

/// A validated client envelope, already stamped with the origin principal
/// and server time, together with the conversation's member list.
pub struct Inbound<'a> {
    pub origin: &'a Connection,
    pub conversation: ConversationId,
    pub envelope: Envelope,
    pub members: Vec<Principal>,
}

/// Handles one client-originated envelope type.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    fn kind(&self) -> EnvelopeType;
    async fn handle(&self, relay: &MessageRelay, inbound: Inbound<'_>) -> Result<FanOutReport>;
}

/// Typed dispatch table: envelope type -> handler.
#[derive(Default)]
pub struct Dispatcher {
    table: HashMap<EnvelopeType, Arc<dyn InboundHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the three client-originated types wired.
    pub fn with_builtin() -> Result<Self> {
        let mut d = Self::new();
        d.register(Arc::new(TypingHandler))?;
        d.register(Arc::new(StopTypingHandler))?;
        d.register(Arc::new(MessageReadHandler))?;
        Ok(d)
    }

    /// Server-initiated types and duplicates are rejected at registration
    /// rather than at dispatch.
    pub fn register(&mut self, handler: Arc<dyn InboundHandler>) -> Result<()> {
        let kind = handler.kind();
        if !kind.is_client_originated() {
            return Err(RelayError::NotAllowed(format!(
                "{kind} is server-initiated and cannot be handled inbound"
            )));
        }
        if self.table.contains_key(&kind) {
            return Err(RelayError::Internal(format!("duplicate handler for {kind}")));
        }
        self.table.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: EnvelopeType) -> Result<Arc<dyn InboundHandler>> {
        self.table
            .get(&kind)
            .cloned()
            .ok_or_else(|| RelayError::NotAllowed(format!("{kind} is not accepted inbound")))
    }

    pub fn registered(&self) -> Vec<EnvelopeType> {
        let mut kinds: Vec<_> = self.table.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

struct TypingHandler;

#[async_trait]
impl InboundHandler for TypingHandler {
    fn kind(&self) -> EnvelopeType {
        EnvelopeType::Typing
    }

    async fn handle(&self, relay: &MessageRelay, inbound: Inbound<'_>) -> Result<FanOutReport> {
        relay
            .typing()
            .mark_typing(&inbound.conversation, inbound.origin.principal(), Instant::now());
        relay.fan_out_inbound(inbound).await
    }
}

struct StopTypingHandler;

#[async_trait]
impl InboundHandler for StopTypingHandler {
    fn kind(&self) -> EnvelopeType {
        EnvelopeType::StopTyping
    }

    async fn handle(&self, relay: &MessageRelay, inbound: Inbound<'_>) -> Result<FanOutReport> {
        relay
            .typing()
            .mark_stopped(&inbound.conversation, inbound.origin.principal());
        relay.fan_out_inbound(inbound).await
    }
}

struct MessageReadHandler;

#[async_trait]
impl InboundHandler for MessageReadHandler {
    fn kind(&self) -> EnvelopeType {
        EnvelopeType::MessageRead
    }

    async fn handle(&self, relay: &MessageRelay, inbound: Inbound<'_>) -> Result<FanOutReport> {
        // No receipt, no fan-out: peers must not see a read the store lost.
        relay
            .receipts()
            .record_read(&inbound.conversation, inbound.origin.principal())
            .await?;
        relay.fan_out_inbound(inbound).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bogus(EnvelopeType);

    #[async_trait]
    impl InboundHandler for Bogus {
        fn kind(&self) -> EnvelopeType {
            self.0
        }
        async fn handle(&self, _relay: &MessageRelay, _inbound: Inbound<'_>) -> Result<FanOutReport> {
            Ok(FanOutReport::default())
        }
    }

    #[test]
    fn builtin_covers_client_types() {
        let d = Dispatcher::with_builtin().unwrap();
        assert_eq!(
            d.registered(),
            vec![EnvelopeType::MessageRead, EnvelopeType::StopTyping, EnvelopeType::Typing]
        );
        assert!(matches!(d.get(EnvelopeType::NewMessage), Err(RelayError::NotAllowed(_))));
    }

    #[test]
    fn new_message_cannot_be_registered() {
        let mut d = Dispatcher::new();
        let err = d.register(Arc::new(Bogus(EnvelopeType::NewMessage))).unwrap_err();
        assert!(matches!(err, RelayError::NotAllowed(_)));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut d = Dispatcher::with_builtin().unwrap();
        assert!(d.register(Arc::new(Bogus(EnvelopeType::Typing))).is_err());
    }
}
