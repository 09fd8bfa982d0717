//! One-time codes for password reset and self-service password change.
//!
//! Each user has at most one pending challenge; issuing a new code for
//! one user leaves other users' challenges alone. Only a SHA-256 digest
//! of the code is stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use dentdesk_core::clock::Clock;
use dentdesk_core::error::DeskResult;
use dentdesk_core::models::otp::OtpChallenge;
use dentdesk_core::store::{KvStore, Txn, keys};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

type ChallengeMap = BTreeMap<Uuid, OtpChallenge>;

#[derive(Debug, Clone)]
pub struct OtpIssuer {
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

/// Digest bound to the user, so a code hash cannot be replayed across
/// users.
fn hash_code(user_id: Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

impl OtpIssuer {
    pub fn new(clock: Arc<dyn Clock>, lifetime_secs: u64) -> Self {
        Self {
            clock,
            lifetime: Duration::seconds(lifetime_secs as i64),
        }
    }

    /// Issue a fresh 6-digit code for `user_id`, replacing that user's
    /// pending one. The plaintext code is returned for out-of-band
    /// delivery and is not kept.
    pub async fn issue<S: KvStore>(&self, tx: &mut Txn<'_, S>, user_id: Uuid) -> DeskResult<String> {
        let code = generate_code();
        let mut challenges: ChallengeMap = tx.load_or_default(keys::OTP_CHALLENGES).await?;
        challenges.insert(
            user_id,
            OtpChallenge {
                user_id,
                code_hash: hash_code(user_id, &code),
                expires_at: self.clock.now() + self.lifetime,
            },
        );
        tx.stage(keys::OTP_CHALLENGES, &challenges)?;
        Ok(code)
    }

    /// Returns `true` and consumes the challenge only if it exists for
    /// this user, is unexpired and the code matches. Any other outcome
    /// is `false` and leaves the challenge in place.
    pub async fn verify<S: KvStore>(
        &self,
        tx: &mut Txn<'_, S>,
        user_id: Uuid,
        code: &str,
    ) -> DeskResult<bool> {
        let mut challenges: ChallengeMap = tx.load_or_default(keys::OTP_CHALLENGES).await?;
        let valid = challenges.get(&user_id).is_some_and(|challenge| {
            challenge.user_id == user_id
                && self.clock.now() <= challenge.expires_at
                && challenge.code_hash == hash_code(user_id, code.trim())
        });

        if valid {
            challenges.remove(&user_id);
            tx.stage(keys::OTP_CHALLENGES, &challenges)?;
        }
        Ok(valid)
    }
}
