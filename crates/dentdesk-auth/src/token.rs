//! Signed session tokens.
//!
//! A token carries the session claims under an EdDSA (Ed25519)
//! signature so that a boundary that receives one can re-check the
//! caller's clinic and role without trusting the client.

use chrono::{DateTime, Utc};
use dentdesk_core::models::session::Session;
use dentdesk_core::models::user::Role;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// JWT claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user ID (UUID string).
    pub sub: String,
    pub login: String,
    pub role: Role,
    pub name: String,
    pub clinic_id: String,
    pub iss: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID (UUID string).
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> AuthResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| AuthError::TokenInvalid(format!("bad subject: {e}")))
    }
}

/// Sign the claims of `session`.
pub fn mint_session_token(session: &Session, config: &AuthConfig) -> AuthResult<String> {
    let claims = SessionClaims {
        sub: session.user_id.to_string(),
        login: session.login.clone(),
        role: session.role,
        name: session.name.clone(),
        clinic_id: session.clinic_id.clone(),
        iss: config.token_issuer.clone(),
        iat: session.issued_at.timestamp(),
        exp: session.expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    let key = EncodingKey::from_ed_pem(config.token_private_key_pem.as_bytes())
        .map_err(|e| AuthError::TokenInvalid(format!("bad private key: {e}")))?;

    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &key)
        .map_err(|e| AuthError::TokenInvalid(format!("JWT encode: {e}")))
}

/// Verify signature and issuer, then check expiry against `now`.
///
/// Expiry is evaluated here rather than by `jsonwebtoken` so that it
/// follows the injected clock.
pub fn validate_session_token(
    token: &str,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> AuthResult<SessionClaims> {
    let key = DecodingKey::from_ed_pem(config.token_public_key_pem.as_bytes())
        .map_err(|e| AuthError::TokenInvalid(format!("bad public key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = false;
    validation.set_issuer(&[&config.token_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

    let claims = jsonwebtoken::decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;

    if claims.exp < now.timestamp() {
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}
