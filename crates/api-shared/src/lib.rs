//! # API Shared
//!
//! Shared utilities and definitions for the EMR APIs.
//!
//! Contains:
//! - REST request/response schemas (`schemas` module)
//! - Shared services like `HealthService`
//! - Authentication utilities
//!
//! Used by `api-rest` and the workspace binaries for common functionality.

pub mod auth;
pub mod health;
pub mod schemas;

pub use auth::{validate_api_key, AuthError};
pub use health::HealthService;
pub use schemas::*;
