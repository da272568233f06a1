//! Domain result type

use super::error::DomainError;

/// Result of a session rule check
pub type Result<T> = std::result::Result<T, DomainError>;
