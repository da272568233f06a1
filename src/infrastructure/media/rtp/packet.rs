//! RTP Packet Implementation (RFC 3550)

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// RTP Packet Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Marker bit
    pub marker: bool,
    /// Payload type
    pub payload_type: u8,
    /// Sequence number
    pub sequence: u16,
    /// Timestamp
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Contributing source identifiers
    pub csrc: Vec<u32>,
    /// Extension header (if extension flag is set)
    pub extension: Option<(u16, Bytes)>,
    /// Payload data
    pub payload: Bytes,
    /// Padding length (if padding flag is set)
    pub padding_len: u8,
}

impl RtpPacket {
    /// Minimum RTP header size (without CSRC, extension, or padding)
    pub const MIN_HEADER_SIZE: usize = 12;

    /// Create a new RTP packet
    pub fn new(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32, payload: Bytes) -> Self {
        Self {
            marker: false,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension: None,
            payload,
            padding_len: 0,
        }
    }

    /// Parse RTP packet from bytes
    pub fn parse(data: &[u8]) -> Result<Self, RtpError> {
        if data.len() < Self::MIN_HEADER_SIZE {
            return Err(RtpError::PacketTooShort(data.len()));
        }

        let mut buf = data;

        // Byte 0: V(2), P(1), X(1), CC(4)
        let byte0 = buf.get_u8();
        let version = (byte0 >> 6) & 0x03;
        let padding = (byte0 & 0x20) != 0;
        let extension = (byte0 & 0x10) != 0;
        let csrc_count = byte0 & 0x0F;

        if version != 2 {
            return Err(RtpError::InvalidVersion(version));
        }

        // Byte 1: M(1), PT(7)
        let byte1 = buf.get_u8();
        let marker = (byte1 & 0x80) != 0;
        let payload_type = byte1 & 0x7F;

        let sequence = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < csrc_count as usize * 4 {
            return Err(RtpError::PacketTooShort(data.len()));
        }
        let csrc = (0..csrc_count).map(|_| buf.get_u32()).collect();

        let extension = if extension {
            if buf.remaining() < 4 {
                return Err(RtpError::PacketTooShort(data.len()));
            }
            let profile = buf.get_u16();
            let length = buf.get_u16() as usize * 4; // Length in 32-bit words

            if buf.remaining() < length {
                return Err(RtpError::PacketTooShort(data.len()));
            }

            let ext_data = Bytes::copy_from_slice(&buf[..length]);
            buf.advance(length);
            Some((profile, ext_data))
        } else {
            None
        };

        let mut payload_len = buf.remaining();
        let mut padding_len = 0;

        if padding {
            if payload_len == 0 {
                return Err(RtpError::InvalidPadding);
            }
            padding_len = buf[payload_len - 1];
            if padding_len == 0 || padding_len as usize > payload_len {
                return Err(RtpError::InvalidPadding);
            }
            payload_len -= padding_len as usize;
        }

        Ok(Self {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrc,
            extension,
            payload: Bytes::copy_from_slice(&buf[..payload_len]),
            padding_len,
        })
    }

    /// Serialize RTP packet to bytes
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.calculate_size());

        let byte0 = (2 << 6)
            | (((self.padding_len > 0) as u8) << 5)
            | ((self.extension.is_some() as u8) << 4)
            | (self.csrc.len() as u8 & 0x0F);
        buf.put_u8(byte0);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some((profile, data)) = &self.extension {
            buf.put_u16(*profile);
            buf.put_u16((data.len() / 4) as u16);
            buf.put_slice(data);
        }

        buf.put_slice(&self.payload);

        if self.padding_len > 0 {
            buf.put_bytes(0, self.padding_len as usize - 1);
            buf.put_u8(self.padding_len);
        }

        buf.freeze()
    }

    fn calculate_size(&self) -> usize {
        Self::MIN_HEADER_SIZE
            + self.csrc.len() * 4
            + self.extension.as_ref().map_or(0, |(_, data)| 4 + data.len())
            + self.payload.len()
            + self.padding_len as usize
    }

    pub fn set_marker(&mut self, marker: bool) {
        self.marker = marker;
    }
}

/// Common RTCP header (RFC 3550 section 6.4)
///
/// Only what is needed to tell RTCP apart from RTP on a muxed port
/// (RFC 5761 section 4) and to trace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub packet_type: u8,
    pub count: u8,
    /// Length in 32-bit words minus one
    pub length: u16,
}

impl RtcpHeader {
    pub const SIZE: usize = 4;

    /// True when the second byte falls in the RTCP packet type range
    pub fn is_rtcp(data: &[u8]) -> bool {
        data.len() >= 2 && (192..=223).contains(&data[1])
    }

    pub fn parse(data: &[u8]) -> Result<Self, RtpError> {
        if data.len() < Self::SIZE {
            return Err(RtpError::PacketTooShort(data.len()));
        }

        let mut buf = data;
        let byte0 = buf.get_u8();
        let version = byte0 >> 6;
        if version != 2 {
            return Err(RtpError::InvalidVersion(version));
        }

        Ok(Self {
            count: byte0 & 0x1F,
            packet_type: buf.get_u8(),
            length: buf.get_u16(),
        })
    }
}

/// RTP errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtpError {
    #[error("Packet too short ({0} bytes)")]
    PacketTooShort(usize),
    #[error("Invalid version: {0}")]
    InvalidVersion(u8),
    #[error("Invalid padding")]
    InvalidPadding,
}
