//! Domain layer - Core session rules
//!
//! This layer contains:
//! - Aggregates: the inbound session and its state progression
//! - Value Objects: dialog identifiers and session states
//! - Shared error and result types

pub mod session;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
