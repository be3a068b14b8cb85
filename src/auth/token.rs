use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::identity::{Principal, Role};
use super::blocklist::TokenBlocklist;
use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

/// Verifies HS256 bearer tokens against the shared secret and the blocklist
pub struct JwtAuthenticator {
    secret: Vec<u8>,
    blocklist: Arc<TokenBlocklist>,
}

impl JwtAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>, blocklist: Arc<TokenBlocklist>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            blocklist,
        }
    }

    pub fn blocklist(&self) -> &Arc<TokenBlocklist> {
        &self.blocklist
    }

    fn signature(&self, signing_input: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidSignature)?;
        mac.update(signing_input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Check signature and expiry; does not consult the blocklist
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<AuthenticatedToken, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::Malformed)?;
        if header.alg != "HS256" {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let signing_input = &token[..token.len() - signature.len() - 1];
        let expected = self.signature(signing_input)?;
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(AuthError::InvalidSignature);
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::Malformed)?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::Malformed)?;
        if expires_at <= now {
            return Err(AuthError::Expired);
        }

        Ok(AuthenticatedToken {
            principal: Principal::new(claims.sub, claims.role),
            expires_at,
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedToken, AuthError> {
        let authenticated = self.decode(token, Utc::now())?;
        if self.blocklist.is_revoked(token).await {
            return Err(AuthError::Revoked);
        }
        Ok(authenticated)
    }

    /// Invalidate a still-valid token until its own expiry
    pub async fn revoke(&self, token: &str) -> Result<AuthenticatedToken, AuthError> {
        let authenticated = self.authenticate(token).await?;
        self.blocklist.revoke(token, authenticated.expires_at).await;

        tracing::info!(
            user_id = %authenticated.principal.user_id,
            expires_at = %authenticated.expires_at,
            "Token revoked"
        );
        Ok(authenticated)
    }

    /// Sign claims with the shared secret. Token issuance belongs to the
    /// account service; this exists for tests and local tooling.
    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = serde_json::to_vec(claims).map_err(|_| AuthError::Malformed)?;
        let signing_input = format!("{header}.{}", URL_SAFE_NO_PAD.encode(payload));
        let signature = self.signature(&signing_input)?;
        Ok(format!("{signing_input}.{signature}"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) const SECRET: &str = "test-jwt-secret";

    pub(crate) fn token_for(authenticator: &JwtAuthenticator, principal: Principal) -> String {
        authenticator
            .issue(&Claims {
                sub: principal.user_id,
                role: principal.role,
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
                iat: Some(Utc::now().timestamp()),
            })
            .unwrap()
    }

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new(SECRET, Arc::new(TokenBlocklist::new()))
    }

    #[tokio::test]
    async fn test_valid_token_yields_principal() {
        let auth = authenticator();
        let principal = Principal::seller(Uuid::new_v4());
        let token = token_for(&auth, principal);

        let authenticated = auth.authenticate(&token).await.unwrap();
        assert_eq!(authenticated.principal, principal);
    }

    #[tokio::test]
    async fn test_expired_and_forged_tokens() {
        let auth = authenticator();
        let expired = auth
            .issue(&Claims {
                sub: Uuid::new_v4(),
                role: Role::User,
                exp: (Utc::now() - Duration::minutes(1)).timestamp(),
                iat: None,
            })
            .unwrap();
        assert!(matches!(auth.authenticate(&expired).await, Err(AuthError::Expired)));

        let other = JwtAuthenticator::new("another-secret", Arc::new(TokenBlocklist::new()));
        let forged = token_for(&other, Principal::admin(Uuid::new_v4()));
        assert!(matches!(auth.authenticate(&forged).await, Err(AuthError::InvalidSignature)));

        assert!(matches!(auth.authenticate("abc.def").await, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let auth = authenticator();
        let token = token_for(&auth, Principal::user(Uuid::new_v4()));

        auth.revoke(&token).await.unwrap();
        assert!(matches!(auth.authenticate(&token).await, Err(AuthError::Revoked)));
        assert_eq!(auth.blocklist().len().await, 1);
    }
}
