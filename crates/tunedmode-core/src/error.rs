//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building domain values from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A process identifier received over the bus was zero or negative.
    #[error("Invalid process id: {0}")]
    InvalidPid(i64),

    /// A profile name was empty or whitespace only.
    #[error("Profile name must not be empty")]
    EmptyProfileName,
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
