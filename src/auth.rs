//! Identity provider boundary
//!
//! The provider verifies a bearer credential and hands back per-request
//! claims, which the rest of the system trusts as-is. The bundled
//! verifier accepts self-contained tokens of the form
//! `base64url(claims_json) "." base64url(sha256(secret "." payload))`,
//! so no outbound call is needed to validate a request.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Claims supplied by the identity provider for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub external_id: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid token")]
    InvalidToken,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<Claims, AuthError>;
}

/// Shared-secret token verifier.
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn signature(&self, payload_b64: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(payload_b64.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Issue a token for the given claims. Used by tests and local tooling.
    pub fn issue(&self, claims: &Claims) -> Result<String, serde_json::Error> {
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signature = self.signature(&payload_b64);
        Ok(format!("{}.{}", payload_b64, signature))
    }
}

#[async_trait]
impl IdentityProvider for TokenVerifier {
    async fn verify(&self, bearer: &str) -> Result<Claims, AuthError> {
        let (payload_b64, signature) = bearer.split_once('.').ok_or(AuthError::InvalidToken)?;

        if self.signature(payload_b64) != signature {
            debug!("Rejected token with bad signature");
            return Err(AuthError::InvalidToken);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidToken)?;

        if claims.external_id.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn claims() -> Claims {
        Claims {
            external_id: "ext_42".into(),
            given_name: Some("Ada".into()),
            family_name: Some("Lovelace".into()),
            email: Some("ada@x.com".into()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_issued_token_verifies() {
        let verifier = TokenVerifier::new("s3cret".into());
        let token = verifier.issue(&claims()).unwrap();

        let verified = assert_ok!(verifier.verify(&token).await);
        assert_eq!(verified.external_id, "ext_42");
        assert_eq!(verified.email.as_deref(), Some("ada@x.com"));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let token = TokenVerifier::new("s3cret".into()).issue(&claims()).unwrap();
        let other = TokenVerifier::new("different".into());
        assert!(matches!(
            other.verify(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_garbage_tokens_are_rejected() {
        let verifier = TokenVerifier::new("s3cret".into());
        for bad in ["", "no-dot", "a.b", "!!!.???"] {
            assert!(verifier.verify(bad).await.is_err(), "accepted {:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_empty_external_id_is_rejected() {
        let verifier = TokenVerifier::new("s3cret".into());
        let mut anonymous = claims();
        anonymous.external_id = String::new();
        let token = verifier.issue(&anonymous).unwrap();
        assert!(verifier.verify(&token).await.is_err());
    }
}
