//! Session handler seam between the acceptor and call logic

use super::message::SipError;
use crate::domain::session::DialogId;
use crate::infrastructure::media::{EchoStats, MediaError};
use async_trait::async_trait;

/// One inbound call as seen by a handler
///
/// Each signaling step must be called at most once, in order:
/// `trying`, `ringing`, `answer`. `echo` is only valid once answered.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InboundDialog: Send {
    fn id(&self) -> &DialogId;

    /// Send 100 Trying
    async fn trying(&mut self) -> Result<(), SipError>;

    /// Send 180 Ringing
    async fn ringing(&mut self) -> Result<(), SipError>;

    /// Send 200 OK with the SDP answer and wait for the ACK
    async fn answer(&mut self) -> Result<(), SipError>;

    /// Echo media until the call ends or is cancelled
    async fn echo(&mut self) -> Result<EchoStats, MediaError>;
}

/// Trait for handling accepted sessions
///
/// Called exactly once per inbound INVITE, on its own task.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn handle(&self, dialog: &mut dyn InboundDialog);
}
