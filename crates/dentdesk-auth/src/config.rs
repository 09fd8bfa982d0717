//! Authentication configuration.

use dentdesk_core::models::subscription::MissingSubscriptionPolicy;

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session lifetime in seconds (default: 28_800 = 8 hours).
    pub session_lifetime_secs: u64,
    /// PEM-encoded Ed25519 private key for session token signing.
    pub token_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for session token verification.
    pub token_public_key_pem: String,
    /// Session token issuer (`iss` claim).
    pub token_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Length of generated temporary passwords.
    pub temporary_password_length: usize,
    /// One-time code lifetime in seconds (default: 300 = 5 minutes).
    pub otp_lifetime_secs: u64,
    /// Consecutive failed logins before lockout (default: 5).
    pub max_failed_login_attempts: u32,
    /// Lockout window in seconds (default: 120 = 2 minutes).
    pub lockout_duration_secs: u64,
    /// Patient edit lock lifetime in seconds (default: 300 = 5 minutes).
    pub edit_lock_lifetime_secs: u64,
    /// Length of the trial created with every new clinic.
    pub trial_days: i64,
    /// Length of an explicitly created subscription.
    pub default_subscription_days: i64,
    /// What `check_access` reports for a clinic with no subscription.
    pub missing_subscription_policy: MissingSubscriptionPolicy,
    pub audit_log_capacity: usize,
    pub action_log_capacity: usize,
    pub patient_log_capacity: usize,
    /// Address stamped on action log entries.
    pub client_ip: String,
    pub bootstrap_superadmin_username: String,
    /// Initial superadmin password. `None` generates a temporary one.
    pub bootstrap_superadmin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: 28_800,
            token_private_key_pem: String::new(),
            token_public_key_pem: String::new(),
            token_issuer: "dentdesk".into(),
            pepper: None,
            min_password_length: 6,
            temporary_password_length: 10,
            otp_lifetime_secs: 300,
            max_failed_login_attempts: 5,
            lockout_duration_secs: 120,
            edit_lock_lifetime_secs: 300,
            trial_days: 30,
            default_subscription_days: 365,
            missing_subscription_policy: MissingSubscriptionPolicy::FailOpen,
            audit_log_capacity: 500,
            action_log_capacity: 2000,
            patient_log_capacity: 2000,
            client_ip: "127.0.0.1".into(),
            bootstrap_superadmin_username: "superadmin".into(),
            bootstrap_superadmin_password: None,
        }
    }
}
