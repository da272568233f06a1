//! SIP transport layer - UDP only

use super::message::{SipError, SipMessage};
use crate::config::DebugFlags;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest datagram we accept for signaling
pub const MAX_DATAGRAM: usize = 65535;

/// Incoming SIP message with source information
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message: SipMessage,
    pub source: SocketAddr,
}

/// UDP transport shared by the server loop and every dialog task
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    debug: DebugFlags,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr, debug: DebugFlags) -> Result<Self, SipError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to bind UDP socket: {}", e)))?;

        info!("UDP transport listening on {}", socket.local_addr().unwrap_or(addr));

        Ok(Self { socket, debug })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SipError> {
        self.socket
            .local_addr()
            .map_err(|e| SipError::TransportError(e.to_string()))
    }

    /// Receive one datagram
    ///
    /// Returns `Ok(None)` for datagrams that are not SIP; those are logged
    /// and skipped. Socket failures are returned as errors.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<Option<IncomingMessage>, SipError> {
        let (size, source) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to receive UDP packet: {}", e)))?;

        debug!("Received {} bytes from {} via UDP", size, source);
        if self.debug.sip {
            debug!("<<< {}\n{}", source, String::from_utf8_lossy(&buf[..size]));
        }

        match SipMessage::parse(&buf[..size]) {
            Ok(message) => Ok(Some(IncomingMessage { message, source })),
            Err(e) => {
                warn!("Failed to parse SIP message from {}: {}", source, e);
                Ok(None)
            }
        }
    }

    pub async fn send(&self, data: &[u8], destination: SocketAddr) -> Result<(), SipError> {
        if self.debug.sip {
            debug!(">>> {}\n{}", destination, String::from_utf8_lossy(data));
        }

        self.socket
            .send_to(data, destination)
            .await
            .map(|_| ())
            .map_err(|e| SipError::TransportError(format!("Failed to send to {}: {}", destination, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_skips_garbage() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), DebugFlags::default())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"\x80\x08not sip", addr).await.unwrap();
        peer.send_to(
            b"OPTIONS sip:echo@127.0.0.1 SIP/2.0\r\n\
              Via: SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bK1\r\n\
              From: <sip:a@b>;tag=1\r\n\
              To: <sip:echo@127.0.0.1>\r\n\
              Call-ID: opt-1\r\n\
              CSeq: 1 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
            addr,
        )
        .await
        .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        assert!(transport.recv(&mut buf).await.unwrap().is_none());

        let incoming = transport.recv(&mut buf).await.unwrap().unwrap();
        assert_eq!(incoming.source, peer.local_addr().unwrap());
        assert_eq!(
            incoming.message.as_request().and_then(|r| r.call_id()),
            Some("opt-1".to_string())
        );
    }
}
