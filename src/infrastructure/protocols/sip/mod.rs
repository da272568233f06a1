//! SIP protocol implementation
//!
//! A minimal user agent server based on RFC 3261: it answers inbound
//! INVITEs and keeps each call in its own dialog task.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   Session Handler       │
//! │  (application layer)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │    Dialog Layer         │
//! │  (DialogServerSession)  │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Acceptor              │
//! │  (SipServer, routing)   │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport Layer       │
//! │  (UDP)                  │
//! └─────────────────────────┘
//! ```

pub mod builder;
pub mod dialog;
pub mod handler;
pub mod message;
pub mod sdp;
pub mod server;
pub mod transport;

pub use builder::ResponseBuilder;
pub use dialog::{DialogServerSession, InDialogRequest};
pub use handler::{InboundDialog, SessionHandler};
pub use message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
pub use sdp::SdpSession;
pub use server::{SipServer, SipServerConfig};
pub use transport::{IncomingMessage, UdpTransport};
