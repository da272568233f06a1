//! RTP (Real-time Transport Protocol) header handling
//!
//! Headers are decoded for validation and tracing only; packets are always
//! echoed as the exact bytes that arrived.

pub mod packet;

pub use packet::{RtcpHeader, RtpError, RtpPacket};
