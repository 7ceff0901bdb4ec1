//! # Storage Module
//!
//! Durable state: identities, contact digests and backup metadata, on
//! sled with bincode values. Short-lived secrets never come here; those
//! live in the [`crate::store`] ephemeral store.

pub mod db;

pub use db::{DbError, DbResult, IdentityDb};
