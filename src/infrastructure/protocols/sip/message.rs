//! SIP message types and parsing

use bytes::Bytes;
use rsip::{Header, Headers, Method, Request, Response, Uri};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid dialog state: {0}")]
    InvalidState(String),

    #[error("No acceptable media: {0}")]
    NotAcceptable(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Remote party hung up")]
    RemoteHangup,

    #[error("Dialog cancelled")]
    Cancelled,
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

impl From<crate::domain::DomainError> for SipError {
    fn from(err: crate::domain::DomainError) -> Self {
        SipError::InvalidState(err.to_string())
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
        }
    }

    pub fn from_rsip(method: &Method) -> Option<Self> {
        match method {
            Method::Invite => Some(SipMethod::Invite),
            Method::Ack => Some(SipMethod::Ack),
            Method::Cancel => Some(SipMethod::Cancel),
            Method::Bye => Some(SipMethod::Bye),
            Method::Options => Some(SipMethod::Options),
            _ => None,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value part of a header ("Call-ID: abc" -> "abc")
pub fn header_value(header: &Header) -> String {
    let line = header.to_string();
    match line.split_once(':') {
        Some((_, value)) => value.trim().to_string(),
        None => line,
    }
}

/// Read a `;name=value` parameter from a From/To/Via value
pub fn header_param(value: &str, name: &str) -> Option<String> {
    // Parameters after the closing '>' belong to the header, not the URI
    let params = match value.rfind('>') {
        Some(pos) => &value[pos + 1..],
        None => value,
    };

    params.split(';').skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| val.trim().to_string())
    })
}

/// URI part of a name-addr ("Bob <sip:bob@host>;tag=1" -> "sip:bob@host")
pub fn header_uri(value: &str) -> &str {
    match (value.find('<'), value.find('>')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value.split(';').next().unwrap_or(value).trim(),
    }
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn method_name(&self) -> String {
        self.inner.method.to_string()
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    fn find_header<F>(&self, pick: F) -> Option<String>
    where
        F: Fn(&Header) -> bool,
    {
        self.inner
            .headers
            .iter()
            .find(|h| pick(h))
            .map(header_value)
    }

    pub fn call_id(&self) -> Option<String> {
        self.find_header(|h| matches!(h, Header::CallId(_)))
    }

    pub fn from_header(&self) -> Option<String> {
        self.find_header(|h| matches!(h, Header::From(_)))
    }

    pub fn to_header(&self) -> Option<String> {
        self.find_header(|h| matches!(h, Header::To(_)))
    }

    pub fn contact(&self) -> Option<String> {
        self.find_header(|h| matches!(h, Header::Contact(_)))
    }

    pub fn from_tag(&self) -> Option<String> {
        self.from_header().and_then(|v| header_param(&v, "tag"))
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to_header().and_then(|v| header_param(&v, "tag"))
    }

    pub fn cseq(&self) -> Option<u32> {
        self.find_header(|h| matches!(h, Header::CSeq(_)))
            .and_then(|v| v.split_whitespace().next().and_then(|n| n.parse().ok()))
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn to_header(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find(|h| matches!(h, Header::To(_)))
            .map(header_value)
    }

    pub fn to_tag(&self) -> Option<String> {
        self.to_header().and_then(|v| header_param(&v, "tag"))
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        // Try parsing as request first
        if let Ok(request) = SipRequest::parse(data) {
            return Ok(SipMessage::Request(request));
        }

        if let Ok(response) = SipResponse::parse(data) {
            return Ok(SipMessage::Response(response));
        }

        Err(SipError::ParseError(
            "Could not parse as SIP request or response".to_string(),
        ))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &[u8] = b"INVITE sip:echo@127.0.0.1:5090 SIP/2.0\r\n\
        Via: SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bK776asdhds\r\n\
        Max-Forwards: 70\r\n\
        From: \"Alice\" <sip:alice@example.com>;tag=1928301774\r\n\
        To: <sip:echo@127.0.0.1:5090>\r\n\
        Call-ID: a84b4c76e66710@pc33.example.com\r\n\
        CSeq: 314159 INVITE\r\n\
        Contact: <sip:alice@127.0.0.1:5070>\r\n\
        Content-Length: 0\r\n\r\n";

    #[test]
    fn test_parse_invite_request() {
        let msg = SipMessage::parse(INVITE).unwrap();
        assert!(msg.is_request());

        let req = msg.as_request().unwrap();
        assert_eq!(req.method(), Some(SipMethod::Invite));
        assert_eq!(req.call_id(), Some("a84b4c76e66710@pc33.example.com".to_string()));
        assert_eq!(req.cseq(), Some(314159));
        assert_eq!(req.from_tag(), Some("1928301774".to_string()));
        assert_eq!(req.to_tag(), None);
        assert_eq!(
            req.contact().as_deref().map(header_uri),
            Some("sip:alice@127.0.0.1:5070")
        );
    }

    #[test]
    fn test_parse_response() {
        let data = b"SIP/2.0 200 OK\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: Alice <sip:alice@example.com>;tag=1928301774\r\n\
                     To: Alice <sip:alice@example.com>;tag=a6c85cf\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 314159 REGISTER\r\n\
                     Content-Length: 0\r\n\r\n";

        let SipMessage::Response(resp) = SipMessage::parse(data).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.to_tag(), Some("a6c85cf".to_string()));
    }

    #[test]
    fn test_header_param_ignores_uri_params() {
        let value = "<sip:bob@host;transport=udp;tag=wrong>;tag=right";
        assert_eq!(header_param(value, "tag"), Some("right".to_string()));
        assert_eq!(header_param("sip:bob@host", "tag"), None);
        assert_eq!(header_uri(value), "sip:bob@host;transport=udp;tag=wrong");
        assert_eq!(header_uri("sip:bob@host;tag=1"), "sip:bob@host");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SipMessage::parse(b"\x80\x08hello").is_err());
    }
}
