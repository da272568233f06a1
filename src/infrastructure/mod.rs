//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - SIP signaling (transport, dialogs, acceptor)
//! - Media transports, codecs and the echo paths

pub mod media;
pub mod protocols;
