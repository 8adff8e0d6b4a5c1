use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use tribune_core::error::{Result, RelayError};
use tribune_core::{ConversationId, Principal};

use super::{ConversationDirectory, ReadReceipts};

#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: Vec<Principal>,
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    user_id: &'a Principal,
}

/// Conversation store reached over the CMS REST API.
///
/// - `GET  {base}/conversations/{id}/members` -> `{"members": [..]}`
/// - `POST {base}/conversations/{id}/read`    <- `{"user_id": ..}`
///
/// Conversation ids come from clients, so each one is pushed as a single
/// percent-encoded path segment and can never leave `conversations/`.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
    service_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(base_url: &str, service_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("http client build failed: {e}")))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| RelayError::BadRequest(format!("directory.base_url is not a URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::BadRequest("directory.base_url cannot be a base URL".into()));
        }
        Ok(Self {
            client,
            base_url,
            service_token,
        })
    }

    fn url(&self, conversation: &ConversationId, leaf: &str) -> Result<Url> {
        let id = conversation.as_str();
        // `url` silently skips dot segments, which would drop the id
        if id.is_empty() || id == "." || id == ".." {
            return Err(RelayError::BadRequest(format!("invalid conversation id {id:?}")));
        }
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| RelayError::Internal("directory base URL lost its path".into()))?
            .pop_if_empty()
            .push("conversations")
            .push(id)
            .push(leaf);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

fn upstream(what: &str, e: impl std::fmt::Display) -> RelayError {
    RelayError::Collaborator(format!("{what}: {e}"))
}

#[async_trait]
impl ConversationDirectory for HttpDirectory {
    async fn members(&self, conversation: &ConversationId) -> Result<Vec<Principal>> {
        let resp = self
            .authorize(self.client.get(self.url(conversation, "members")?))
            .send()
            .await
            .map_err(|e| upstream("members request", e))?
            .error_for_status()
            .map_err(|e| upstream("members status", e))?;
        let body: MembersResponse = resp.json().await.map_err(|e| upstream("members body", e))?;
        Ok(body.members)
    }
}

#[async_trait]
impl ReadReceipts for HttpDirectory {
    async fn record_read(&self, conversation: &ConversationId, principal: &Principal) -> Result<()> {
        self.authorize(self.client.post(self.url(conversation, "read")?))
            .json(&ReadRequest { user_id: principal })
            .send()
            .await
            .map_err(|e| upstream("read request", e))?
            .error_for_status()
            .map_err(|e| upstream("read status", e))?;
        Ok(())
    }
}
