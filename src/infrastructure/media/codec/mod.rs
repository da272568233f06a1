//! Audio codec descriptors
//!
//! Nothing here encodes or decodes audio. The echo paths pass payloads
//! through untouched; descriptors only label the stream and drive SDP.

pub mod negotiator;

pub use negotiator::{CodecNegotiator, Negotiated, OfferedFormat};

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported codec: {0}. Supported: PCMA, PCMU, opus")]
    Unsupported(String),
}

/// Immutable codec descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Codec {
    pub name: &'static str,
    pub payload_type: u8,
    pub sample_rate: u32,
    /// Duration of audio carried by one packet
    pub sample_duration: Duration,
    pub channels: u16,
}

/// G.711 A-law
pub const CODEC_AUDIO_ALAW: Codec = Codec {
    name: "PCMA",
    payload_type: 8,
    sample_rate: 8000,
    sample_duration: Duration::from_millis(20),
    channels: 1,
};

/// G.711 μ-law
pub const CODEC_AUDIO_ULAW: Codec = Codec {
    name: "PCMU",
    payload_type: 0,
    sample_rate: 8000,
    sample_duration: Duration::from_millis(20),
    channels: 1,
};

/// Opus on its conventional dynamic payload type
pub const CODEC_AUDIO_OPUS: Codec = Codec {
    name: "opus",
    payload_type: 96,
    sample_rate: 48000,
    sample_duration: Duration::from_millis(20),
    channels: 2,
};

impl Codec {
    /// Encoding name for an `a=rtpmap` line
    pub fn encoding(&self) -> String {
        if self.channels > 1 {
            format!("{}/{}/{}", self.name, self.sample_rate, self.channels)
        } else {
            format!("{}/{}", self.name, self.sample_rate)
        }
    }

    /// Same codec carried on a different payload type
    pub fn with_payload_type(self, payload_type: u8) -> Self {
        Self {
            payload_type,
            ..self
        }
    }
}

impl FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PCMA" => Ok(CODEC_AUDIO_ALAW),
            "PCMU" => Ok(CODEC_AUDIO_ULAW),
            "OPUS" => Ok(CODEC_AUDIO_OPUS),
            _ => Err(CodecError::Unsupported(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!("pcma".parse::<Codec>().unwrap(), CODEC_AUDIO_ALAW);
        assert_eq!("PCMA".parse::<Codec>().unwrap(), CODEC_AUDIO_ALAW);
        assert_eq!("Pcmu".parse::<Codec>().unwrap(), CODEC_AUDIO_ULAW);
        assert_eq!("OPUS".parse::<Codec>().unwrap(), CODEC_AUDIO_OPUS);
        assert_eq!("opus".parse::<Codec>().unwrap(), CODEC_AUDIO_OPUS);
    }

    #[test]
    fn test_unknown_codec_rejected() {
        let err = "G711".parse::<Codec>().unwrap_err();
        assert_eq!(err, CodecError::Unsupported("G711".to_string()));
        assert!(err.to_string().contains("Supported: PCMA, PCMU, opus"));
        assert!("".parse::<Codec>().is_err());
    }

    #[test]
    fn test_descriptor_parameters() {
        assert_eq!(CODEC_AUDIO_ALAW.payload_type, 8);
        assert_eq!(CODEC_AUDIO_ULAW.payload_type, 0);
        assert_eq!(CODEC_AUDIO_OPUS.sample_duration, Duration::from_millis(20));
        assert_eq!(CODEC_AUDIO_ALAW.encoding(), "PCMA/8000");
        assert_eq!(CODEC_AUDIO_OPUS.encoding(), "opus/48000/2");
    }
}
