//! External collaborators consumed by the relay.
//!
//! The relay owns no domain data: identities come from an `Authenticator`,
//! membership and read receipts from the conversation store. Backends are
//! chosen from config at startup.

mod auth;
mod http;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use tribune_core::error::Result;
use tribune_core::{ConversationId, Principal};

use crate::config::{AuthSection, DirectorySection};

pub use auth::{JwtAuthenticator, StaticTokenAuthenticator};
pub use http::HttpDirectory;
pub use memory::MemoryDirectory;

/// Turns a handshake token into a principal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal>;
}

/// Answers "who belongs to conversation X".
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    async fn members(&self, conversation: &ConversationId) -> Result<Vec<Principal>>;
}

/// Records that a principal has read a conversation.
#[async_trait]
pub trait ReadReceipts: Send + Sync {
    async fn record_read(&self, conversation: &ConversationId, principal: &Principal) -> Result<()>;
}

/// Resolved collaborator set shared by the gateway.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn Authenticator>,
    pub directory: Arc<dyn ConversationDirectory>,
    pub receipts: Arc<dyn ReadReceipts>,
}

impl Collaborators {
    pub fn from_config(auth: &AuthSection, directory: &DirectorySection) -> Result<Self> {
        let auth: Arc<dyn Authenticator> = match auth {
            AuthSection::Jwt { secret, issuer } => {
                Arc::new(JwtAuthenticator::new(secret.as_bytes(), issuer.clone()))
            }
            AuthSection::Static { tokens } => Arc::new(StaticTokenAuthenticator::new(
                tokens.iter().map(|(t, p)| (t.clone(), Principal::from(p.as_str()))),
            )),
        };

        let (directory, receipts): (Arc<dyn ConversationDirectory>, Arc<dyn ReadReceipts>) =
            match directory {
                DirectorySection::Memory { conversations } => {
                    let mem = Arc::new(MemoryDirectory::from_table(conversations));
                    (mem.clone(), mem)
                }
                DirectorySection::Http {
                    base_url,
                    service_token,
                    timeout_ms,
                } => {
                    let http = Arc::new(HttpDirectory::new(
                        base_url,
                        service_token.clone(),
                        std::time::Duration::from_millis(*timeout_ms),
                    )?);
                    (http.clone(), http)
                }
            };

        Ok(Self {
            auth,
            directory,
            receipts,
        })
    }
}
