//! Media transport
//!
//! A media transport hands out whole inbound frames and accepts frames to
//! send back. The UDP implementation keeps datagram boundaries intact and
//! never rewrites bytes.

use super::rtp::{RtcpHeader, RtpError, RtpPacket};
use crate::config::DebugFlags;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

/// One standard Ethernet MTU
pub const MTU: usize = 1500;

#[derive(Error, Debug)]
pub enum MediaError {
    /// The remote side closed the stream
    #[error("end of media stream")]
    EndOfStream,

    /// Datagram did not fit the receive buffer
    #[error("truncated frame: datagram larger than {0} bytes")]
    TruncatedFrame(usize),

    #[error("invalid media frame: {0}")]
    Rtp(#[from] RtpError),

    #[error("media I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("session is not established")]
    NotEstablished,
}

impl MediaError {
    /// Clean close by the peer, not a failure
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, MediaError::EndOfStream)
    }
}

/// Decoded header of a media frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Rtp {
        payload_type: u8,
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
    },
    Rtcp {
        packet_type: u8,
    },
}

/// One inbound media frame: the exact bytes received plus their header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    data: Bytes,
    kind: FrameKind,
}

impl MediaFrame {
    /// Validate a datagram as RTP or RTCP
    pub fn decode(data: Bytes) -> Result<Self, RtpError> {
        let kind = if RtcpHeader::is_rtcp(&data) {
            let header = RtcpHeader::parse(&data)?;
            FrameKind::Rtcp {
                packet_type: header.packet_type,
            }
        } else {
            let packet = RtpPacket::parse(&data)?;
            FrameKind::Rtp {
                payload_type: packet.payload_type,
                sequence: packet.sequence,
                timestamp: packet.timestamp,
                ssrc: packet.ssrc,
                marker: packet.marker,
            }
        };

        Ok(Self { data, kind })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Source and sink of media frames for one session
#[async_trait]
pub trait MediaTransport: Send {
    /// Wait for the next inbound frame
    async fn read_frame(&mut self) -> Result<MediaFrame, MediaError>;

    /// Send a frame to the peer unchanged
    async fn write_frame(&mut self, frame: &MediaFrame) -> Result<(), MediaError>;
}

/// RTP over UDP toward the address negotiated in SDP
pub struct RtpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    /// One byte larger than the MTU so oversize datagrams are detectable
    buf: Vec<u8>,
    debug: DebugFlags,
}

impl RtpTransport {
    pub async fn bind(local: SocketAddr, remote: SocketAddr, debug: DebugFlags) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        debug!("RTP socket bound to {}", socket.local_addr()?);

        Ok(Self {
            socket,
            remote,
            buf: vec![0u8; MTU + 1],
            debug,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn trace(&self, direction: &str, frame: &MediaFrame, peer: SocketAddr) {
        match frame.kind() {
            FrameKind::Rtp {
                payload_type,
                sequence,
                timestamp,
                ssrc,
                marker,
            } if self.debug.rtp => {
                debug!(
                    "RTP {} {}: PT={} Seq={} TS={} SSRC={:08x} M={} len={}",
                    direction, peer, payload_type, sequence, timestamp, ssrc, marker, frame.len()
                );
            }
            FrameKind::Rtcp { packet_type } if self.debug.rtcp => {
                debug!(
                    "RTCP {} {}: PT={} len={}",
                    direction,
                    peer,
                    packet_type,
                    frame.len()
                );
            }
            _ => {}
        }
    }
}

#[async_trait]
impl MediaTransport for RtpTransport {
    async fn read_frame(&mut self) -> Result<MediaFrame, MediaError> {
        let (size, source) = self.socket.recv_from(&mut self.buf).await?;
        if size > MTU {
            return Err(MediaError::TruncatedFrame(MTU));
        }

        let frame = MediaFrame::decode(Bytes::copy_from_slice(&self.buf[..size]))?;
        self.trace("<-", &frame, source);
        Ok(frame)
    }

    async fn write_frame(&mut self, frame: &MediaFrame) -> Result<(), MediaError> {
        self.socket.send_to(frame.data(), self.remote).await?;
        self.trace("->", frame, self.remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keeps_exact_bytes() {
        let mut packet = RtpPacket::new(8, 42, 160, 0xDEADBEEF, Bytes::from_static(b"\x01\x02\x03"));
        packet.padding_len = 2;
        let raw = packet.serialize();

        let frame = MediaFrame::decode(raw.clone()).unwrap();
        assert_eq!(frame.data(), &raw);
        assert_eq!(
            frame.kind(),
            FrameKind::Rtp {
                payload_type: 8,
                sequence: 42,
                timestamp: 160,
                ssrc: 0xDEADBEEF,
                marker: false,
            }
        );
    }

    #[test]
    fn test_decode_rejects_partial_header() {
        let err = MediaFrame::decode(Bytes::from_static(&[0x80, 0x08, 0x00])).unwrap_err();
        assert_eq!(err, RtpError::PacketTooShort(3));
    }

    #[tokio::test]
    async fn test_rtp_transport_roundtrip_over_loopback() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = RtpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
            DebugFlags::default(),
        )
        .await
        .unwrap();

        let raw = RtpPacket::new(0, 7, 1120, 99, Bytes::from_static(b"voice")).serialize();
        peer.send_to(&raw, transport.local_addr().unwrap()).await.unwrap();

        let frame = transport.read_frame().await.unwrap();
        transport.write_frame(&frame).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &raw[..]);
        assert_eq!(from, transport.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_oversize_datagram_is_truncated_frame() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = RtpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            peer.local_addr().unwrap(),
            DebugFlags::default(),
        )
        .await
        .unwrap();

        let mut big = vec![0u8; MTU + 100];
        big[0] = 0x80;
        peer.send_to(&big, transport.local_addr().unwrap()).await.unwrap();

        let err = transport.read_frame().await.unwrap_err();
        assert!(matches!(err, MediaError::TruncatedFrame(MTU)));
        assert!(!err.is_end_of_stream());
    }
}
