//! SIP message builder utilities

use super::message::{header_param, SipError, SipRequest, SipResponse};
use rsip::{Header, Headers, Method, Request, Response, StatusCode, Uri, Version};

/// Build a SIP response from a request
pub struct ResponseBuilder {
    status_code: u16,
    to_tag: Option<String>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            to_tag: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn trying() -> Self {
        Self::new(100)
    }

    pub fn ringing() -> Self {
        Self::new(180)
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn call_does_not_exist() -> Self {
        Self::new(481)
    }

    pub fn not_acceptable_here() -> Self {
        Self::new(488)
    }

    pub fn not_implemented() -> Self {
        Self::new(501)
    }

    /// Local tag added to the To header unless the request already has one
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn contact(self, uri: &str) -> Self {
        self.header(Header::Contact(format!("<{}>", uri).into()))
    }

    /// SDP body with matching Content-Type
    pub fn sdp(self, sdp: String) -> Self {
        self.header(Header::ContentType("application/sdp".into()))
            .body(sdp.into_bytes())
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn build_for_request(self, request: &SipRequest) -> Result<SipResponse, SipError> {
        let mut headers = Vec::with_capacity(self.headers.len() + 6);

        // Copy essential headers from request
        for header in request.headers().iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    headers.push(header.clone());
                }
                Header::To(to) => match &self.to_tag {
                    Some(tag) if request.to_tag().is_none() => {
                        let value = super::message::header_value(header);
                        headers.push(Header::To(format!("{};tag={}", value, tag).into()));
                    }
                    _ => headers.push(Header::To(to.clone())),
                },
                _ => {}
            }
        }

        headers.extend(self.headers);
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

/// Build an in-dialog BYE toward the remote party of an inbound INVITE
///
/// Our From is the INVITE's To (with our tag), our To is the INVITE's From.
pub fn build_bye(
    invite: &SipRequest,
    local_tag: &str,
    local_addr: std::net::SocketAddr,
    cseq: u32,
) -> Result<SipRequest, SipError> {
    let missing = |name: &str| SipError::InvalidMessage(format!("INVITE has no {} header", name));

    let remote_from = invite.from_header().ok_or_else(|| missing("From"))?;
    let local_to = invite.to_header().ok_or_else(|| missing("To"))?;
    let call_id = invite.call_id().ok_or_else(|| missing("Call-ID"))?;

    let target = invite
        .contact()
        .map(|c| super::message::header_uri(&c).to_string())
        .unwrap_or_else(|| super::message::header_uri(&remote_from).to_string());
    let uri = Uri::try_from(target.as_str())?;

    let local_from = match header_param(&local_to, "tag") {
        Some(_) => local_to,
        None => format!("{};tag={}", local_to, local_tag),
    };

    let headers = vec![
        Header::Via(
            format!(
                "SIP/2.0/UDP {};branch=z9hG4bK{};rport",
                local_addr,
                uuid::Uuid::new_v4().simple()
            )
            .into(),
        ),
        Header::MaxForwards("70".into()),
        Header::From(local_from.into()),
        Header::To(remote_from.into()),
        Header::CallId(call_id.into()),
        Header::CSeq(format!("{} BYE", cseq).into()),
        Header::ContentLength("0".into()),
    ];

    Ok(SipRequest::new(Request {
        method: Method::Bye,
        uri,
        version: Version::V2,
        headers: Headers::from(headers),
        body: Vec::new(),
    }))
}
