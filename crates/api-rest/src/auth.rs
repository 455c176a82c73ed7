//! Session claims carried in the bearer token.
//!
//! Tokens are issued and verified by the upstream auth server. This layer only decodes the
//! payload to learn who is calling.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use cdr_core::{Role, Session};
use cdr_types::NonEmptyText;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub nhs_number: Option<NhsNumberClaim>,
}

/// Auth servers send the NHS number as either a JSON number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NhsNumberClaim {
    Number(u64),
    Text(String),
}

impl Claims {
    /// Decode the payload segment of a JWT.
    pub fn decode(token: &str) -> Result<Self, ApiError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| ApiError::Unauthorized("malformed token".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ApiError::Unauthorized(format!("malformed token payload: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token claims: {e}")))
    }

    pub fn into_session(self) -> Result<Session, ApiError> {
        let id = NonEmptyText::new(&self.session_id)
            .map_err(|_| ApiError::Unauthorized("token has no sessionId".into()))?;
        let nhs_number = match self.nhs_number {
            None => None,
            Some(NhsNumberClaim::Number(n)) => Some(n),
            Some(NhsNumberClaim::Text(text)) => Some(text.trim().parse().map_err(|_| {
                ApiError::Unauthorized(format!("invalid nhsNumber claim: {text}"))
            })?),
        };
        Ok(Session::new(id, self.role, nhs_number))
    }
}

/// Extractor yielding the caller's [`Session`].
pub struct Authenticated(pub Session);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected a Bearer token".into()))?;

        let session = Claims::decode(token.trim())?.into_session()?;
        tracing::debug!(session = session.id(), role = ?session.role(), "authenticated");
        Ok(Authenticated(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(claims: &str) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims))
    }

    #[test]
    fn decodes_clinician_claims() {
        let session = Claims::decode(&token(r#"{"sessionId":"s1","role":"IDCR"}"#))
            .and_then(Claims::into_session)
            .expect("session");
        assert_eq!(session.id(), "s1");
        assert_eq!(session.role(), Role::Idcr);
        assert_eq!(session.nhs_number(), None);
    }

    #[test]
    fn accepts_string_nhs_number() {
        let session = Claims::decode(&token(
            r#"{"sessionId":"s2","role":"phrUser","nhsNumber":"9999999000"}"#,
        ))
        .and_then(Claims::into_session)
        .expect("session");
        assert_eq!(session.role(), Role::PhrUser);
        assert_eq!(session.nhs_number(), Some(9999999000));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Claims::decode("not-a-jwt").is_err());
        assert!(Claims::decode(&token("{}")).is_err());
        assert!(Claims::decode(&token(r#"{"sessionId":"","role":"IDCR"}"#))
            .and_then(Claims::into_session)
            .is_err());
    }
}
