use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use tribune_core::error::Result;
use tribune_core::{ConversationId, Principal};

use super::{ConversationDirectory, ReadReceipts};

/// In-process membership table with last-read bookkeeping.
#[derive(Default)]
pub struct MemoryDirectory {
    members: DashMap<ConversationId, Vec<Principal>>,
    last_read: DashMap<(ConversationId, Principal), DateTime<Utc>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: &HashMap<String, Vec<String>>) -> Self {
        let dir = Self::new();
        for (conv, members) in table {
            dir.set_members(
                ConversationId::from(conv.as_str()),
                members.iter().map(|m| Principal::from(m.as_str())),
            );
        }
        dir
    }

    /// Replace the member list of a conversation (duplicates collapsed).
    pub fn set_members(&self, conversation: ConversationId, members: impl IntoIterator<Item = Principal>) {
        let mut list: Vec<Principal> = members.into_iter().collect();
        list.sort();
        list.dedup();
        self.members.insert(conversation, list);
    }

    pub fn last_read(&self, conversation: &ConversationId, principal: &Principal) -> Option<DateTime<Utc>> {
        self.last_read
            .get(&(conversation.clone(), principal.clone()))
            .map(|r| *r.value())
    }
}

#[async_trait]
impl ConversationDirectory for MemoryDirectory {
    async fn members(&self, conversation: &ConversationId) -> Result<Vec<Principal>> {
        Ok(self
            .members
            .get(conversation)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReadReceipts for MemoryDirectory {
    async fn record_read(&self, conversation: &ConversationId, principal: &Principal) -> Result<()> {
        self.last_read
            .insert((conversation.clone(), principal.clone()), Utc::now());
        Ok(())
    }
}
