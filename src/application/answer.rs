//! Answer-and-echo use case

use crate::infrastructure::media::{EchoStats, MediaError};
use crate::infrastructure::protocols::sip::{InboundDialog, SessionHandler, SipError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

/// Why a session failed
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("signaling failed: {0}")]
    Signaling(#[from] SipError),

    #[error("media failed: {0}")]
    Media(#[from] MediaError),
}

impl SessionError {
    /// Shutdown interrupted the call before it was up
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Signaling(SipError::Cancelled))
    }
}

/// Drive one call: 100, 180, 200, then echo media until it ends
///
/// Any signaling failure aborts before media starts. The remote side
/// hanging up is a normal end of the call.
pub async fn answer_with_echo<D>(dialog: &mut D) -> Result<EchoStats, SessionError>
where
    D: InboundDialog + ?Sized,
{
    dialog.trying().await?;
    dialog.ringing().await?;
    dialog.answer().await?;

    match dialog.echo().await {
        Ok(stats) => Ok(stats),
        Err(e) if e.is_end_of_stream() => Ok(EchoStats::default()),
        Err(e) => Err(e.into()),
    }
}

/// Session handler that answers every call and echoes it
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAnswerHandler;

#[async_trait]
impl SessionHandler for EchoAnswerHandler {
    async fn handle(&self, dialog: &mut dyn InboundDialog) {
        match answer_with_echo(dialog).await {
            Ok(stats) => {
                info!(id = %dialog.id(), packets = stats.packets, bytes = stats.bytes, "Session completed")
            }
            Err(e) if e.is_cancelled() => info!(id = %dialog.id(), "Session cancelled"),
            Err(e) => error!(id = %dialog.id(), "Session failed: {}", e),
        }
    }
}
