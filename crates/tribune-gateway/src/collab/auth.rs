use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use tribune_core::error::{Result, RelayError};
use tribune_core::Principal;

use super::Authenticator;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Validates HS256 access tokens issued by the CMS.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8], issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "jwt rejected");
            RelayError::AuthFailed
        })?;
        if data.claims.sub.is_empty() {
            return Err(RelayError::AuthFailed);
        }
        Ok(Principal::from(data.claims.sub))
    }
}

/// Fixed token table for local development and tests.
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, Principal)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        self.tokens.get(token).cloned().ok_or(RelayError::AuthFailed)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef-test";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<&'a str>,
    }

    fn token(sub: &str, exp_offset_secs: i64, iss: Option<&str>) -> String {
        let claims = TestClaims {
            sub,
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
            iss,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[tokio::test]
    async fn jwt_subject_becomes_principal() {
        let auth = JwtAuthenticator::new(SECRET, None);
        let p = auth.authenticate(&token("alice", 600, None)).await.unwrap();
        assert_eq!(p.as_str(), "alice");
    }

    #[tokio::test]
    async fn jwt_rejects_expired_and_foreign_tokens() {
        let auth = JwtAuthenticator::new(SECRET, None);
        assert!(auth.authenticate(&token("alice", -3600, None)).await.is_err());
        assert!(auth.authenticate("garbage").await.is_err());

        let other = JwtAuthenticator::new(b"another-secret-entirely", None);
        assert!(other.authenticate(&token("alice", 600, None)).await.is_err());
    }

    #[tokio::test]
    async fn jwt_checks_issuer_when_configured() {
        let auth = JwtAuthenticator::new(SECRET, Some("cms".into()));
        assert!(auth.authenticate(&token("alice", 600, Some("cms"))).await.is_ok());
        assert!(auth.authenticate(&token("alice", 600, Some("elsewhere"))).await.is_err());
    }

    #[tokio::test]
    async fn static_table_lookup() {
        let auth = StaticTokenAuthenticator::new([("t-alice".to_string(), Principal::from("alice"))]);
        assert_eq!(auth.authenticate("t-alice").await.unwrap().as_str(), "alice");
        assert!(matches!(auth.authenticate("nope").await, Err(RelayError::AuthFailed)));
    }
}
