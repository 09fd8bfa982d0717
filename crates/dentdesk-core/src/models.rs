//! Domain models for DentDesk.
//!
//! These are the records persisted through [`crate::store::KvStore`]
//! and the input/patch types used to create and update them.

pub mod action_log;
pub mod audit;
pub mod clinic;
pub mod edit_lock;
pub mod login_failure;
pub mod otp;
pub mod patient_log;
pub mod session;
pub mod subscription;
pub mod user;
