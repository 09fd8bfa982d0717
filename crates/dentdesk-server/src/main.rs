//! DentDesk — process entry point.
//!
//! Initialises logging, reads configuration from `DENTDESK_*`
//! environment variables, connects to SurrealDB, applies migrations and
//! seeds the default clinic and superadmin account.

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dentdesk_auth::{AuthConfig, AuthService};
use dentdesk_core::clock::SystemClock;
use dentdesk_core::models::subscription::MissingSubscriptionPolicy;
use dentdesk_core::store::MemoryStore;
use dentdesk_db::{DbConfig, DbManager, SurrealStore, run_migrations};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|raw| raw.parse().with_context(|| format!("invalid value for {name}")))
        .transpose()
}

fn db_config() -> DbConfig {
    let mut config = DbConfig::default();
    if let Some(endpoint) = var("DENTDESK_DB_ENDPOINT") {
        config.endpoint = endpoint;
    }
    if let Some(ns) = var("DENTDESK_DB_NAMESPACE") {
        config.namespace = ns;
    }
    if let Some(db) = var("DENTDESK_DB_DATABASE") {
        config.database = db;
    }
    if let Some(user) = var("DENTDESK_DB_USERNAME") {
        config.username = user;
    }
    if let Some(password) = var("DENTDESK_DB_PASSWORD") {
        config.password = password;
    }
    config
}

fn auth_config() -> Result<AuthConfig> {
    let mut config = AuthConfig::default();

    let private_key = var("DENTDESK_TOKEN_PRIVATE_KEY_FILE")
        .context("DENTDESK_TOKEN_PRIVATE_KEY_FILE must point to an Ed25519 PEM key")?;
    config.token_private_key_pem = std::fs::read_to_string(&private_key)
        .with_context(|| format!("failed to read {private_key}"))?;
    let public_key = var("DENTDESK_TOKEN_PUBLIC_KEY_FILE")
        .context("DENTDESK_TOKEN_PUBLIC_KEY_FILE must point to an Ed25519 PEM key")?;
    config.token_public_key_pem = std::fs::read_to_string(&public_key)
        .with_context(|| format!("failed to read {public_key}"))?;

    if let Some(issuer) = var("DENTDESK_TOKEN_ISSUER") {
        config.token_issuer = issuer;
    }
    config.pepper = var("DENTDESK_PASSWORD_PEPPER");
    if let Some(secs) = parsed("DENTDESK_SESSION_LIFETIME_SECS")? {
        config.session_lifetime_secs = secs;
    }
    if let Some(secs) = parsed("DENTDESK_OTP_LIFETIME_SECS")? {
        config.otp_lifetime_secs = secs;
    }
    if let Some(attempts) = parsed("DENTDESK_MAX_FAILED_LOGINS")? {
        config.max_failed_login_attempts = attempts;
    }
    if let Some(secs) = parsed("DENTDESK_LOCKOUT_SECS")? {
        config.lockout_duration_secs = secs;
    }
    if let Some(len) = parsed("DENTDESK_MIN_PASSWORD_LENGTH")? {
        config.min_password_length = len;
    }
    if let Some(days) = parsed("DENTDESK_TRIAL_DAYS")? {
        config.trial_days = days;
    }
    if let Some(policy) = var("DENTDESK_MISSING_SUBSCRIPTION_POLICY") {
        config.missing_subscription_policy = match policy.as_str() {
            "fail_open" => MissingSubscriptionPolicy::FailOpen,
            "fail_closed" => MissingSubscriptionPolicy::FailClosed,
            other => bail!("invalid value for DENTDESK_MISSING_SUBSCRIPTION_POLICY: {other}"),
        };
    }
    if let Some(ip) = var("DENTDESK_CLIENT_IP") {
        config.client_ip = ip;
    }
    if let Some(username) = var("DENTDESK_SUPERADMIN_USERNAME") {
        config.bootstrap_superadmin_username = username;
    }
    config.bootstrap_superadmin_password = var("DENTDESK_SUPERADMIN_PASSWORD");

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dentdesk=info".parse()?))
        .json()
        .init();

    info!("Starting DentDesk...");

    let auth = auth_config()?;
    let db = DbManager::connect(&db_config())
        .await
        .context("failed to connect to SurrealDB")?;
    run_migrations(db.client()).await?;

    let service = AuthService::new(
        SurrealStore::new(db.client().clone()),
        MemoryStore::new(),
        auth,
        Arc::new(SystemClock),
    );

    if let Some(generated) = service.bootstrap().await? {
        // Shown once on the console, never through the log pipeline.
        eprintln!(
            "Generated password for '{}': {} (must be changed at first login)",
            generated.user.username, generated.password
        );
    }

    info!("DentDesk ready");
    Ok(())
}
