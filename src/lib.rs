//! cipbx - a SIP answer-and-echo PBX and an RTP packet echo relay
//!
//! The PBX accepts inbound INVITEs, answers them with 100/180/200 and
//! echoes the caller's RTP back. The relay forwards every datagram it
//! receives to a fixed remote endpoint, for testing media paths without
//! signaling.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
