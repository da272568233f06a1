//! Media processing implementations

pub mod codec;
pub mod echo;
pub mod relay;
pub mod rtp;
pub mod transport;

pub use codec::{Codec, CodecError, CodecNegotiator, CODEC_AUDIO_ALAW, CODEC_AUDIO_OPUS, CODEC_AUDIO_ULAW};
pub use echo::{echo_loop, EchoStats};
pub use relay::{is_progress_tick, PacketEchoRelay, RelayError};
pub use rtp::{RtcpHeader, RtpError, RtpPacket};
pub use transport::{FrameKind, MediaError, MediaFrame, MediaTransport, RtpTransport, MTU};
