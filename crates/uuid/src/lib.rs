//! UUID and sharded-path utilities.
//!
//! Every clinical and reference entity in the EMR is identified by a UUID. Identifiers cross the
//! wire in the encounter transaction, are typed on the command line, and name files in the
//! file-backed store, so the codebase uses one *canonical* textual form for all of them:
//! **36 lowercase characters in the hyphenated 8-4-4-4-12 layout**.
//!
//! This crate provides:
//! - A small wrapper type ([`EmrUuid`]) that *guarantees* the canonical format once constructed.
//! - Shared sharding logic to derive storage locations from an identifier.
//!
//! ## Canonical UUID form
//! - Length: 36
//! - Characters: `0-9`, `a-f`, and `-` at offsets 8, 13, 18 and 23
//! - Example: `550e8400-e29b-41d4-a716-446655440000`
//!
//! Non-canonical values (uppercase, simple/braced forms, wrong length, non-hex) are rejected.
//!
//! ## Sharded layout
//! For a canonical UUID `u`, the file store keeps an entity under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>.json`

mod service;

pub use service::{EmrUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
