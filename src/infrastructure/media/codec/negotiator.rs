//! Codec Negotiation
//!
//! Picks the codec for an SDP answer from what the caller offered

use super::{Codec, CODEC_AUDIO_ALAW, CODEC_AUDIO_OPUS, CODEC_AUDIO_ULAW};

/// One format from an `m=` line together with its `a=rtpmap` encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferedFormat {
    pub payload_type: u8,
    pub encoding: Option<String>,
}

impl OfferedFormat {
    pub fn new(payload_type: u8, encoding: Option<String>) -> Self {
        Self {
            payload_type,
            encoding,
        }
    }

    /// Encoding name without clock rate, e.g. "opus" for "opus/48000/2"
    fn encoding_name(&self) -> Option<&str> {
        self.encoding
            .as_deref()
            .and_then(|e| e.split('/').next())
            .map(str::trim)
    }
}

/// Result of a successful negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Chosen codec, carried on the payload type the caller offered
    pub codec: Codec,
    /// Payload type for RFC 4733 events, if the caller offered them
    pub telephone_event: Option<u8>,
}

/// Codec Negotiator
pub struct CodecNegotiator {
    supported_codecs: Vec<Codec>,
}

impl CodecNegotiator {
    /// Create negotiator with default supported codecs
    pub fn new() -> Self {
        Self {
            supported_codecs: vec![CODEC_AUDIO_ULAW, CODEC_AUDIO_ALAW, CODEC_AUDIO_OPUS],
        }
    }

    /// Negotiate codecs based on offer
    ///
    /// The caller's preference order wins: the first offered format we
    /// support is chosen.
    pub fn negotiate(&self, offered: &[OfferedFormat]) -> Option<Negotiated> {
        let codec = offered.iter().find_map(|format| self.match_format(format))?;

        let telephone_event = offered
            .iter()
            .find(|f| {
                f.encoding_name()
                    .is_some_and(|name| name.eq_ignore_ascii_case("telephone-event"))
            })
            .map(|f| f.payload_type);

        Some(Negotiated {
            codec,
            telephone_event,
        })
    }

    fn match_format(&self, format: &OfferedFormat) -> Option<Codec> {
        match format.encoding_name() {
            Some(name) => self
                .supported_codecs
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| c.with_payload_type(format.payload_type)),
            // Static payload types may come without rtpmap
            None => self
                .supported_codecs
                .iter()
                .filter(|c| c.payload_type < 96)
                .find(|c| c.payload_type == format.payload_type)
                .copied(),
        }
    }
}

impl Default for CodecNegotiator {
    fn default() -> Self {
        Self::new()
    }
}
