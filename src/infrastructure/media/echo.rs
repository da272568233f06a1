//! Media echo loop

use super::transport::{MediaError, MediaTransport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counters for one echo or relay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    pub packets: u64,
    pub bytes: u64,
}

impl EchoStats {
    pub fn record(&mut self, size: usize) {
        self.packets += 1;
        self.bytes += size as u64;
    }
}

/// Write every inbound frame straight back to the same transport
///
/// Frames are echoed one at a time in arrival order. Returns:
/// - `Ok(stats)` when `cancel` fires,
/// - `Err(MediaError::EndOfStream)` when the peer closes the stream,
/// - any other error from reading or writing.
pub async fn echo_loop<T>(transport: &mut T, cancel: &CancellationToken) -> Result<EchoStats, MediaError>
where
    T: MediaTransport + ?Sized,
{
    let mut stats = EchoStats::default();

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(packets = stats.packets, bytes = stats.bytes, "Echo cancelled");
                return Ok(stats);
            }
            frame = transport.read_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(packets = stats.packets, bytes = stats.bytes, "Echo stopped: {}", e);
                return Err(e);
            }
        };

        transport.write_frame(&frame).await?;
        stats.record(frame.len());
    }
}
