//! Session issuer.
//!
//! The session lives in the tab-lifetime store under a single key. It
//! is issued only after the caller has checked the account, the clinic
//! subscription and the forced-change flag.

use std::sync::Arc;

use chrono::Duration;
use dentdesk_core::clock::Clock;
use dentdesk_core::error::DeskResult;
use dentdesk_core::models::clinic::DEFAULT_CLINIC_ID;
use dentdesk_core::models::session::Session;
use dentdesk_core::models::user::User;
use dentdesk_core::store::{KvStore, Txn, keys};

use crate::config::AuthConfig;
use crate::error::AuthResult;
use crate::token::{self, SessionClaims};

#[derive(Debug, Clone)]
pub struct SessionIssuer {
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl SessionIssuer {
    pub fn new(clock: Arc<dyn Clock>, config: AuthConfig) -> Self {
        Self { clock, config }
    }

    pub async fn issue<T: KvStore>(&self, tab: &T, user: &User) -> DeskResult<Session> {
        let now = self.clock.now();
        let clinic_id = if user.clinic_id.is_empty() {
            DEFAULT_CLINIC_ID.to_string()
        } else {
            user.clinic_id.clone()
        };
        let session = Session {
            user_id: user.id,
            login: user.username.clone(),
            role: user.role,
            name: user.name.clone(),
            clinic_id,
            issued_at: now,
            expires_at: now + Duration::seconds(self.config.session_lifetime_secs as i64),
        };

        let mut tx = Txn::begin(tab);
        tx.stage(keys::SESSION, &session)?;
        tx.commit().await?;
        Ok(session)
    }

    /// The stored session, or `None` once it has expired (the expired
    /// session is removed on the way out).
    pub async fn current<T: KvStore>(&self, tab: &T) -> DeskResult<Option<Session>> {
        let tx = Txn::begin(tab);
        let Some(session) = tx.load::<Session>(keys::SESSION).await? else {
            return Ok(None);
        };
        if session.is_expired(self.clock.now()) {
            self.clear(tab).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn clear<T: KvStore>(&self, tab: &T) -> DeskResult<()> {
        let mut tx = Txn::begin(tab);
        tx.remove(keys::SESSION);
        tx.commit().await
    }

    pub fn mint_token(&self, session: &Session) -> AuthResult<String> {
        token::mint_session_token(session, &self.config)
    }

    pub fn validate_token(&self, token: &str) -> AuthResult<SessionClaims> {
        token::validate_session_token(token, &self.config, self.clock.now())
    }
}
