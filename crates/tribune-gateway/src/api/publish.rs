//! `POST /v1/internal/conversations/:id/publish`
//!
//! Called by the REST boundary once a message is persisted. Disabled unless
//! `internal.publish_token` is configured; callers present it as a bearer
//! token.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::Deserialize;
use serde_json::value::RawValue;

use tribune_core::error::RelayError;
use tribune_core::protocol::{Envelope, EnvelopeType};
use tribune_core::{ConversationId, Principal};

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::realtime::FanOutReport;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishBody {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: EnvelopeType,
    #[serde(default)]
    pub message: Option<Box<RawValue>>,
    #[serde(default)]
    pub user_id: Option<Principal>,
}

fn default_kind() -> EnvelopeType {
    EnvelopeType::NewMessage
}

pub async fn publish(
    State(app): State<AppState>,
    Path(conversation): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PublishBody>,
) -> Result<Json<FanOutReport>, ApiError> {
    authorize(&app, &headers)?;

    let mut env = Envelope::new(body.kind);
    env.message = body.message;
    env.user_id = body.user_id;

    let conversation = ConversationId::from(conversation);
    let report = app.relay().publish(&conversation, env).await?;
    tracing::debug!(%conversation, delivered = report.delivered, "published");
    Ok(Json(report))
}

fn authorize(app: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = app.cfg().internal.publish_token.as_deref() else {
        return Err(RelayError::NotAllowed("publish endpoint disabled".into()).into());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(t) if t == expected => Ok(()),
        _ => Err(RelayError::AuthFailed.into()),
    }
}
