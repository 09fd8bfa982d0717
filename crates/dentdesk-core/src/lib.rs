//! DentDesk Core — domain types shared by every DentDesk crate.
//!
//! This crate provides:
//! - Domain models for users, clinics, subscriptions and the logs
//!   that accompany them ([`models`])
//! - The error taxonomy ([`error::DeskError`])
//! - The key-value persistence contract and its unit of work
//!   ([`store::KvStore`], [`store::Txn`])
//! - An injectable time source ([`clock::Clock`])
//! - Row-level scoping for the external patient tables ([`scope`])

pub mod clock;
pub mod error;
pub mod models;
pub mod scope;
pub mod store;
