//! Simple SDP (Session Description Protocol) handling

use crate::infrastructure::media::codec::{Negotiated, OfferedFormat};
use std::net::{IpAddr, SocketAddr};

/// Simple SDP session
#[derive(Debug, Clone)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    /// Session-level connection, may be overridden per media
    pub connection: Option<SdpConnection>,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct SdpConnection {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

impl SdpConnection {
    fn for_ip(ip: IpAddr) -> Self {
        Self {
            network_type: "IN".to_string(),
            address_type: address_type(ip).to_string(),
            address: ip.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub media_type: String,   // "audio", "video"
    pub port: u16,
    pub protocol: String,     // "RTP/AVP"
    pub formats: Vec<String>, // Codec payload types
    pub rtpmap: Vec<(String, String)>, // (payload_type, encoding)
    pub connection: Option<SdpConnection>,
}

impl SdpMedia {
    /// Formats in offer order, each with its rtpmap encoding if present
    pub fn offered_formats(&self) -> Vec<OfferedFormat> {
        self.formats
            .iter()
            .filter_map(|f| f.parse::<u8>().ok())
            .map(|pt| {
                let encoding = self
                    .rtpmap
                    .iter()
                    .find(|(map_pt, _)| map_pt.parse::<u8>().ok() == Some(pt))
                    .map(|(_, enc)| enc.clone());
                OfferedFormat::new(pt, encoding)
            })
            .collect()
    }
}

fn address_type(ip: IpAddr) -> &'static str {
    if ip.is_ipv4() {
        "IP4"
    } else {
        "IP6"
    }
}

impl SdpSession {
    /// Create the answer for one negotiated audio stream
    pub fn create_audio_answer(local_ip: IpAddr, local_port: u16, negotiated: &Negotiated) -> Self {
        let codec = negotiated.codec;
        let mut formats = vec![codec.payload_type.to_string()];
        let mut rtpmap = vec![(codec.payload_type.to_string(), codec.encoding())];

        if let Some(pt) = negotiated.telephone_event {
            formats.push(pt.to_string());
            rtpmap.push((pt.to_string(), "telephone-event/8000".to_string()));
        }

        Self {
            version: 0,
            origin: SdpOrigin {
                username: "cipbx".to_string(),
                session_id: chrono::Utc::now().timestamp().to_string(),
                session_version: "1".to_string(),
                network_type: "IN".to_string(),
                address_type: address_type(local_ip).to_string(),
                address: local_ip.to_string(),
            },
            session_name: "cipbx echo".to_string(),
            connection: Some(SdpConnection::for_ip(local_ip)),
            media: vec![SdpMedia {
                media_type: "audio".to_string(),
                port: local_port,
                protocol: "RTP/AVP".to_string(),
                formats,
                rtpmap,
                connection: None,
            }],
        }
    }

    /// Convert to SDP string
    pub fn to_sdp_string(&self) -> String {
        let mut sdp = String::new();

        sdp.push_str(&format!("v={}\r\n", self.version));
        sdp.push_str(&format!(
            "o={} {} {} {} {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            self.origin.network_type,
            self.origin.address_type,
            self.origin.address
        ));
        sdp.push_str(&format!("s={}\r\n", self.session_name));

        if let Some(conn) = &self.connection {
            sdp.push_str(&format!(
                "c={} {} {}\r\n",
                conn.network_type, conn.address_type, conn.address
            ));
        }

        sdp.push_str("t=0 0\r\n");

        for media in &self.media {
            sdp.push_str(&format!(
                "m={} {} {} {}\r\n",
                media.media_type,
                media.port,
                media.protocol,
                media.formats.join(" ")
            ));

            for (pt, encoding) in &media.rtpmap {
                sdp.push_str(&format!("a=rtpmap:{} {}\r\n", pt, encoding));
            }

            sdp.push_str("a=sendrecv\r\n");
        }

        sdp
    }

    /// Parse SDP from string
    pub fn parse(sdp_body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin: Option<SdpOrigin> = None;
        let mut session_name = String::new();
        let mut connection: Option<SdpConnection> = None;
        let mut media: Vec<SdpMedia> = Vec::new();
        let mut current_media: Option<SdpMedia> = None;

        for line in sdp_body.lines() {
            let Some((field_type, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim();

            match field_type {
                "v" => {
                    version = value.parse().unwrap_or(0);
                }
                "o" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 6 {
                        origin = Some(SdpOrigin {
                            username: parts[0].to_string(),
                            session_id: parts[1].to_string(),
                            session_version: parts[2].to_string(),
                            network_type: parts[3].to_string(),
                            address_type: parts[4].to_string(),
                            address: parts[5].to_string(),
                        });
                    }
                }
                "s" => {
                    session_name = value.to_string();
                }
                "c" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let conn = SdpConnection {
                            network_type: parts[0].to_string(),
                            address_type: parts[1].to_string(),
                            // Drop a multicast TTL suffix if present
                            address: parts[2].split('/').next().unwrap_or(parts[2]).to_string(),
                        };

                        match current_media.as_mut() {
                            Some(m) => m.connection = Some(conn),
                            None => connection = Some(conn),
                        }
                    }
                }
                "m" => {
                    if let Some(m) = current_media.take() {
                        media.push(m);
                    }

                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 4 {
                        current_media = Some(SdpMedia {
                            media_type: parts[0].to_string(),
                            port: parts[1].parse().unwrap_or(0),
                            protocol: parts[2].to_string(),
                            formats: parts[3..].iter().map(|s| s.to_string()).collect(),
                            rtpmap: Vec::new(),
                            connection: None,
                        });
                    }
                }
                "a" => {
                    if let (Some(media), Some(rtpmap_value)) =
                        (current_media.as_mut(), value.strip_prefix("rtpmap:"))
                    {
                        if let Some((pt, encoding)) = rtpmap_value.split_once(' ') {
                            media.rtpmap.push((pt.to_string(), encoding.trim().to_string()));
                        }
                    }
                }
                _ => {
                    // Ignore other fields
                }
            }
        }

        if let Some(m) = current_media.take() {
            media.push(m);
        }

        Some(Self {
            version,
            origin: origin?,
            session_name,
            connection,
            media,
        })
    }

    /// Get media description for audio
    pub fn audio_media(&self) -> Option<&SdpMedia> {
        self.media
            .iter()
            .find(|m| m.media_type == "audio" && m.port != 0)
    }

    /// Where the offerer wants to receive audio
    pub fn audio_rtp_addr(&self) -> Option<SocketAddr> {
        let audio = self.audio_media()?;
        let conn = audio.connection.as_ref().or(self.connection.as_ref())?;
        let ip: IpAddr = conn.address.parse().ok()?;
        Some(SocketAddr::new(ip, audio.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::media::codec::{CodecNegotiator, CODEC_AUDIO_ALAW};

    const OFFER: &str = "v=0\r\n\
        o=alice 2890844526 2890844526 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        c=IN IP4 127.0.0.1\r\n\
        t=0 0\r\n\
        m=audio 49170 RTP/AVP 8 0 101\r\n\
        a=rtpmap:8 PCMA/8000\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:101 telephone-event/8000\r\n\
        a=fmtp:101 0-16\r\n";

    #[test]
    fn test_parse_offer() {
        let sdp = SdpSession::parse(OFFER).unwrap();
        assert_eq!(sdp.origin.username, "alice");
        assert_eq!(sdp.audio_rtp_addr(), Some("127.0.0.1:49170".parse().unwrap()));

        let formats = sdp.audio_media().unwrap().offered_formats();
        assert_eq!(formats.len(), 3);
        assert_eq!(formats[0], OfferedFormat::new(8, Some("PCMA/8000".to_string())));
        assert_eq!(formats[2].encoding.as_deref(), Some("telephone-event/8000"));
    }

    #[test]
    fn test_media_level_connection_wins() {
        let offer = OFFER.replace(
            "a=rtpmap:8 PCMA/8000\r\n",
            "c=IN IP4 10.0.0.9\r\na=rtpmap:8 PCMA/8000\r\n",
        );
        let sdp = SdpSession::parse(&offer).unwrap();
        assert_eq!(sdp.audio_rtp_addr(), Some("10.0.0.9:49170".parse().unwrap()));
    }

    #[test]
    fn test_non_ascii_lines_are_skipped() {
        let offer = OFFER.replace("t=0 0\r\n", "t=0 0\r\nxé=1\r\né\r\nz=é\r\n");
        let sdp = SdpSession::parse(&offer).unwrap();
        assert_eq!(sdp.audio_rtp_addr(), Some("127.0.0.1:49170".parse().unwrap()));

        assert!(SdpSession::parse("v=0\r\no=a 1 1 IN IP4 127.0.0.1\r\nxé=1\r\n").is_some());
    }

    #[test]
    fn test_missing_origin_is_rejected() {
        assert!(SdpSession::parse("v=0\r\nm=audio 1 RTP/AVP 0\r\n").is_none());
    }

    #[test]
    fn test_answer_roundtrip() {
        let offer = SdpSession::parse(OFFER).unwrap();
        let negotiated = CodecNegotiator::new()
            .negotiate(&offer.audio_media().unwrap().offered_formats())
            .unwrap();
        assert_eq!(negotiated.codec, CODEC_AUDIO_ALAW);

        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let answer = SdpSession::create_audio_answer(ip, 40000, &negotiated).to_sdp_string();
        assert!(answer.contains("m=audio 40000 RTP/AVP 8 101\r\n"));
        assert!(answer.contains("a=rtpmap:8 PCMA/8000\r\n"));

        let parsed = SdpSession::parse(&answer).unwrap();
        assert_eq!(parsed.audio_rtp_addr(), Some("127.0.0.1:40000".parse().unwrap()));
    }
}
