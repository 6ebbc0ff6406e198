//! Error taxonomy shared across the service
//!
//! Four caller-visible categories drive HTTP status mapping:
//! - `Validation` — malformed input, guard failures; nothing was written
//! - `Conflict` — uniqueness or state-machine violations; nothing was written
//! - `NotFound` — unknown tenant/complaint/job/officer or routing miss
//! - `Dependency` — a backing system call failed or timed out; retryable,
//!   and inside the provisioning saga it triggers compensation

use thiserror::Error;

/// Service-wide error type
#[derive(Debug, Error)]
pub enum NivaranError {
    /// Malformed or out-of-range input; surfaced to the caller, no side effects
    #[error("validation error: {0}")]
    Validation(String),

    /// Uniqueness or state-transition conflict; no partial write
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown entity id or call-routing miss
    #[error("not found: {0}")]
    NotFound(String),

    /// A backing system call failed or timed out; retryable
    #[error("dependency failure: {0}")]
    Dependency(String),

    /// MongoDB error
    #[error("database error: {0}")]
    Database(String),

    /// NATS error
    #[error("nats error: {0}")]
    Nats(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NivaranError {
    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Shorthand for a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shorthand for a dependency error
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, NivaranError>;
