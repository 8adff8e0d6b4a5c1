use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tribune_core::error::RelayError;

/// HTTP rendering of `RelayError`.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::BadRequest(_) | RelayError::UnknownType(_) | RelayError::UnsupportedVersion => {
                StatusCode::BAD_REQUEST
            }
            RelayError::AuthFailed => StatusCode::UNAUTHORIZED,
            RelayError::NotAllowed(_) => StatusCode::FORBIDDEN,
            RelayError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            RelayError::Transport(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.0.client_code().as_str(),
            "message": self.0.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_401() {
        assert_eq!(ApiError(RelayError::AuthFailed).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError(RelayError::Collaborator("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
