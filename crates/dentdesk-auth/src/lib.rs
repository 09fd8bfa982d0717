//! DentDesk Auth — credentials, login lockout, one-time codes,
//! sessions, subscription gating, audit logging and patient edit locks.
//!
//! Every component works on a [`dentdesk_core::store::Txn`] so that
//! [`AuthService`] can compose a state change with the log entries that
//! describe it and commit both at once.

pub mod audit;
pub mod config;
pub mod credentials;
pub mod edit_lock;
pub mod error;
pub mod lockout;
pub mod otp;
pub mod password;
pub mod service;
pub mod session;
pub mod subscription;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use service::{
    AuthService, LoginOutcome, PasswordChangeGrant, PasswordResetGrant, TemporaryPassword,
};
pub use token::SessionClaims;
