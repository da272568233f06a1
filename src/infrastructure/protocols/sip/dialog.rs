//! Server side of one inbound INVITE dialog

use super::builder::{build_bye, ResponseBuilder};
use super::handler::InboundDialog;
use super::message::{SipError, SipMethod, SipRequest};
use super::sdp::SdpSession;
use super::transport::UdpTransport;
use crate::config::DebugFlags;
use crate::domain::session::{DialogId, Session, SessionState};
use crate::infrastructure::media::codec::CodecNegotiator;
use crate::infrastructure::media::{echo_loop, EchoStats, MediaError, RtpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Initial 200 OK retransmit interval
pub const T1: Duration = Duration::from_millis(500);
/// Retransmit interval cap
pub const T2: Duration = Duration::from_secs(4);

/// Request routed to a dialog by Call-ID
#[derive(Debug, Clone)]
pub struct InDialogRequest {
    pub request: SipRequest,
    pub source: SocketAddr,
}

/// Outcome of an in-dialog request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InDialogEvent {
    Ack,
    Bye,
    Continue,
}

/// Address the remote side can reach us on
///
/// A wildcard listen address is resolved by asking the OS which local
/// address routes to `peer`.
pub fn advertised_ip(listen: IpAddr, peer: SocketAddr) -> IpAddr {
    if !listen.is_unspecified() {
        return listen;
    }

    std::net::UdpSocket::bind(SocketAddr::new(listen, 0))
        .and_then(|socket| {
            socket.connect(peer)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(listen)
}

/// Everything needed to answer the caller
struct Signaling {
    transport: Arc<UdpTransport>,
    source: SocketAddr,
    local_tag: String,
    contact: String,
    last_response: Option<Bytes>,
    answer_sdp: Option<String>,
}

impl Signaling {
    /// Respond to the INVITE, remembering the response for retransmission
    async fn respond(&mut self, builder: ResponseBuilder, invite: &SipRequest) -> Result<(), SipError> {
        let data = builder.build_for_request(invite)?.to_bytes();
        self.transport.send(&data, self.source).await?;
        self.last_response = Some(data);
        Ok(())
    }

    async fn retransmit(&self) -> Result<(), SipError> {
        match &self.last_response {
            Some(data) => self.transport.send(data, self.source).await,
            None => Ok(()),
        }
    }

    async fn reply(&self, builder: ResponseBuilder, incoming: &InDialogRequest) -> Result<(), SipError> {
        let response = builder
            .to_tag(self.local_tag.as_str())
            .build_for_request(&incoming.request)?;
        self.transport
            .send(&response.to_bytes(), incoming.source)
            .await
    }

    async fn on_request(&self, incoming: InDialogRequest) -> Result<InDialogEvent, SipError> {
        match incoming.request.method() {
            Some(SipMethod::Ack) => Ok(InDialogEvent::Ack),
            Some(SipMethod::Bye) => {
                self.reply(ResponseBuilder::ok(), &incoming).await?;
                Ok(InDialogEvent::Bye)
            }
            Some(SipMethod::Invite) if incoming.request.to_tag().is_none() => {
                // Retransmitted initial INVITE
                self.retransmit().await?;
                Ok(InDialogEvent::Continue)
            }
            Some(SipMethod::Invite) => {
                // Re-INVITE: keep the media as it is
                let mut builder = ResponseBuilder::ok().contact(&self.contact);
                if let Some(sdp) = &self.answer_sdp {
                    builder = builder.sdp(sdp.clone());
                }
                self.reply(builder, &incoming).await?;
                Ok(InDialogEvent::Continue)
            }
            Some(SipMethod::Cancel) | Some(SipMethod::Options) => {
                self.reply(ResponseBuilder::ok(), &incoming).await?;
                Ok(InDialogEvent::Continue)
            }
            _ => {
                self.reply(ResponseBuilder::not_implemented(), &incoming)
                    .await?;
                Ok(InDialogEvent::Continue)
            }
        }
    }
}

/// UAS dialog for one inbound INVITE
pub struct DialogServerSession {
    session: Session,
    invite: SipRequest,
    signaling: Signaling,
    requests: mpsc::Receiver<InDialogRequest>,
    media: Option<RtpTransport>,
    listen_ip: IpAddr,
    media_ip: IpAddr,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    debug: DebugFlags,
    remote_hangup: bool,
}

impl DialogServerSession {
    pub fn new(
        invite: SipRequest,
        source: SocketAddr,
        transport: Arc<UdpTransport>,
        requests: mpsc::Receiver<InDialogRequest>,
        cancel: CancellationToken,
        debug: DebugFlags,
    ) -> Result<Self, SipError> {
        let call_id = invite
            .call_id()
            .ok_or_else(|| SipError::InvalidMessage("INVITE has no Call-ID".to_string()))?;
        let local_tag = format!("{:08x}", rand::random::<u32>());
        let id = DialogId::new(call_id, invite.from_tag().unwrap_or_default(), local_tag.as_str())?;

        let bound = transport.local_addr()?;
        let media_ip = advertised_ip(bound.ip(), source);
        let local_addr = SocketAddr::new(media_ip, bound.port());

        Ok(Self {
            session: Session::new(id),
            invite,
            signaling: Signaling {
                transport,
                source,
                local_tag,
                contact: format!("sip:cipbx@{}", local_addr),
                last_response: None,
                answer_sdp: None,
            },
            requests,
            media: None,
            listen_ip: bound.ip(),
            media_ip,
            local_addr,
            cancel,
            debug,
            remote_hangup: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The remote side sent BYE
    pub fn remote_hung_up(&self) -> bool {
        self.remote_hangup
    }

    fn log_transition(&self) {
        if self.debug.sip_transaction {
            debug!(id = %self.session.id(), state = %self.session.state(), "Dialog state changed");
        }
    }

    /// A 2xx went out, so the caller may consider the call up
    fn answered(&self) -> bool {
        self.session.is_established() || self.signaling.answer_sdp.is_some()
    }

    /// Send BYE if the call is still up on the remote side
    pub async fn hangup(&mut self) -> Result<(), SipError> {
        if !self.answered() || self.remote_hangup {
            return Ok(());
        }

        let bye = build_bye(&self.invite, &self.signaling.local_tag, self.local_addr, 1)?;
        self.signaling
            .transport
            .send(&bye.to_bytes(), self.signaling.source)
            .await?;
        // Only one BYE per dialog
        self.remote_hangup = true;

        info!(id = %self.session.id(), "Sent BYE");
        Ok(())
    }

    /// Negotiated answer SDP plus the media transport toward the caller
    async fn prepare_media(&self) -> Result<(String, RtpTransport), SipError> {
        let offer = std::str::from_utf8(self.invite.body())
            .ok()
            .and_then(SdpSession::parse)
            .ok_or_else(|| SipError::NotAcceptable("INVITE carries no SDP offer".to_string()))?;

        let audio = offer
            .audio_media()
            .ok_or_else(|| SipError::NotAcceptable("offer has no audio stream".to_string()))?;
        let remote = offer
            .audio_rtp_addr()
            .ok_or_else(|| SipError::NotAcceptable("offer has no connection address".to_string()))?;
        let negotiated = CodecNegotiator::new()
            .negotiate(&audio.offered_formats())
            .ok_or_else(|| SipError::NotAcceptable("no common codec".to_string()))?;

        let media = RtpTransport::bind(SocketAddr::new(self.listen_ip, 0), remote, self.debug)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to bind RTP socket: {}", e)))?;
        let port = media
            .local_addr()
            .map_err(|e| SipError::TransportError(e.to_string()))?
            .port();

        info!(
            id = %self.session.id(),
            codec = negotiated.codec.name,
            payload_type = negotiated.codec.payload_type,
            remote = %remote,
            "Media negotiated"
        );

        let sdp = SdpSession::create_audio_answer(self.media_ip, port, &negotiated).to_sdp_string();
        Ok((sdp, media))
    }

    /// Retransmit the 200 OK until the caller confirms it
    async fn wait_for_ack(&mut self) -> Result<(), SipError> {
        let deadline = Instant::now() + T1 * 64;
        let mut interval = T1;
        let mut next = Instant::now() + interval;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SipError::Cancelled),
                incoming = self.requests.recv() => {
                    let Some(incoming) = incoming else {
                        return Err(SipError::Cancelled);
                    };
                    match self.signaling.on_request(incoming).await? {
                        InDialogEvent::Ack => return Ok(()),
                        InDialogEvent::Bye => {
                            self.remote_hangup = true;
                            return Err(SipError::RemoteHangup);
                        }
                        InDialogEvent::Continue => {}
                    }
                }
                _ = sleep_until(deadline) => return Err(SipError::Timeout("ACK")),
                _ = sleep_until(next) => {
                    self.signaling.retransmit().await?;
                    interval = (interval * 2).min(T2);
                    next = Instant::now() + interval;
                }
            }
        }
    }
}

#[async_trait]
impl InboundDialog for DialogServerSession {
    fn id(&self) -> &DialogId {
        self.session.id()
    }

    async fn trying(&mut self) -> Result<(), SipError> {
        self.session.progress()?;
        self.signaling
            .respond(ResponseBuilder::trying(), &self.invite)
            .await?;
        self.log_transition();
        Ok(())
    }

    async fn ringing(&mut self) -> Result<(), SipError> {
        self.session.ring()?;
        let builder = ResponseBuilder::ringing().to_tag(self.signaling.local_tag.as_str());
        self.signaling.respond(builder, &self.invite).await?;
        self.log_transition();
        Ok(())
    }

    async fn answer(&mut self) -> Result<(), SipError> {
        if !self.state().can_transition_to(&SessionState::Established) {
            return Err(SipError::InvalidState(format!(
                "cannot answer from {}",
                self.state()
            )));
        }

        let (sdp, media) = match self.prepare_media().await {
            Ok(prepared) => prepared,
            Err(e) => {
                if matches!(e, SipError::NotAcceptable(_)) {
                    let builder = ResponseBuilder::not_acceptable_here()
                        .to_tag(self.signaling.local_tag.as_str());
                    self.signaling.respond(builder, &self.invite).await?;
                }
                return Err(e);
            }
        };

        let builder = ResponseBuilder::ok()
            .to_tag(self.signaling.local_tag.as_str())
            .contact(&self.signaling.contact)
            .sdp(sdp.clone());
        self.signaling.respond(builder, &self.invite).await?;
        self.signaling.answer_sdp = Some(sdp);
        self.media = Some(media);

        self.wait_for_ack().await?;
        self.session.establish()?;
        self.log_transition();

        if let Some(setup) = self.session.setup_duration() {
            info!(id = %self.session.id(), setup_ms = setup.num_milliseconds(), "Call established");
        }
        Ok(())
    }

    async fn echo(&mut self) -> Result<EchoStats, MediaError> {
        if !self.session.is_established() {
            return Err(MediaError::NotEstablished);
        }
        let media = self.media.as_mut().ok_or(MediaError::NotEstablished)?;

        let echo = echo_loop(media, &self.cancel);
        tokio::pin!(echo);
        let mut requests_open = true;

        loop {
            tokio::select! {
                result = &mut echo => return result,
                incoming = self.requests.recv(), if requests_open => {
                    let Some(incoming) = incoming else {
                        requests_open = false;
                        continue;
                    };
                    match self.signaling.on_request(incoming).await {
                        Ok(InDialogEvent::Bye) => {
                            self.remote_hangup = true;
                            info!(id = %self.session.id(), "Remote hung up");
                            return Err(MediaError::EndOfStream);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(id = %self.session.id(), "Failed to answer in-dialog request: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::message::SipResponse;
    use crate::infrastructure::protocols::sip::transport::MAX_DATAGRAM;
    use tokio::net::UdpSocket;

    fn invite(body: &str) -> SipRequest {
        let text = format!(
            "INVITE sip:echo@127.0.0.1 SIP/2.0\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bKdlg\r\n\
             From: <sip:alice@127.0.0.1>;tag=alice1\r\n\
             To: <sip:echo@127.0.0.1>\r\n\
             Call-ID: dialog-test\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:alice@127.0.0.1:5070>\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        SipRequest::parse(text.as_bytes()).unwrap()
    }

    const OFFER: &str = "v=0\r\n\
        o=alice 1 1 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        c=IN IP4 127.0.0.1\r\n\
        t=0 0\r\n\
        m=audio 49170 RTP/AVP 0\r\n";

    async fn dialog(
        body: &str,
    ) -> (DialogServerSession, UdpSocket, mpsc::Sender<InDialogRequest>) {
        dialog_with(body, CancellationToken::new()).await
    }

    async fn dialog_with(
        body: &str,
        cancel: CancellationToken,
    ) -> (DialogServerSession, UdpSocket, mpsc::Sender<InDialogRequest>) {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), DebugFlags::default())
            .await
            .unwrap();
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = mpsc::channel(8);

        let dialog = DialogServerSession::new(
            invite(body),
            caller.local_addr().unwrap(),
            Arc::new(transport),
            rx,
            cancel,
            DebugFlags::default(),
        )
        .unwrap();
        (dialog, caller, tx)
    }

    async fn next_status(caller: &UdpSocket) -> u16 {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), caller.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        SipResponse::parse(&buf[..n]).unwrap().status_code()
    }

    #[test]
    fn test_specific_listen_ip_is_advertised() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(advertised_ip(ip, "127.0.0.1:5070".parse().unwrap()), ip);
    }

    #[test]
    fn test_wildcard_listen_ip_resolves_toward_peer() {
        let ip = advertised_ip("0.0.0.0".parse().unwrap(), "127.0.0.1:5070".parse().unwrap());
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn test_answer_without_offer_is_rejected() {
        let (mut dialog, caller, _tx) = dialog("").await;

        dialog.trying().await.unwrap();
        dialog.ringing().await.unwrap();
        let err = dialog.answer().await.unwrap_err();

        assert!(matches!(err, SipError::NotAcceptable(_)));
        assert_eq!(next_status(&caller).await, 100);
        assert_eq!(next_status(&caller).await, 180);
        assert_eq!(next_status(&caller).await, 488);
        assert_eq!(dialog.state(), SessionState::Ringing);
    }

    #[tokio::test]
    async fn test_answer_before_ringing_is_refused() {
        let (mut dialog, _caller, _tx) = dialog("").await;
        dialog.trying().await.unwrap();

        let err = dialog.answer().await.unwrap_err();
        assert!(matches!(err, SipError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_echo_requires_established_dialog() {
        let (mut dialog, _caller, _tx) = dialog("").await;
        let err = dialog.echo().await.unwrap_err();
        assert!(matches!(err, MediaError::NotEstablished));
    }

    #[tokio::test]
    async fn test_cancel_during_ack_wait_still_sends_bye() {
        let cancel = CancellationToken::new();
        let (mut dialog, caller, _tx) = dialog_with(OFFER, cancel.clone()).await;
        dialog.trying().await.unwrap();
        dialog.ringing().await.unwrap();

        cancel.cancel();
        let err = dialog.answer().await.unwrap_err();
        assert!(matches!(err, SipError::Cancelled));
        assert_eq!(dialog.state(), SessionState::Ringing);

        dialog.hangup().await.unwrap();

        assert_eq!(next_status(&caller).await, 100);
        assert_eq!(next_status(&caller).await, 180);
        assert_eq!(next_status(&caller).await, 200);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), caller.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let bye = SipRequest::parse(&buf[..n]).unwrap();
        assert_eq!(bye.method(), Some(SipMethod::Bye));
        assert_eq!(bye.to_tag().as_deref(), Some("alice1"));

        // One BYE only
        dialog.hangup().await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(100), caller.recv_from(&mut buf))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_rejected_offer_sends_no_bye() {
        let (mut dialog, caller, _tx) = dialog("").await;
        dialog.trying().await.unwrap();
        dialog.ringing().await.unwrap();
        assert!(dialog.answer().await.is_err());
        dialog.hangup().await.unwrap();

        for expected in [100, 180, 488] {
            assert_eq!(next_status(&caller).await, expected);
        }
        let mut buf = vec![0u8; MAX_DATAGRAM];
        assert!(
            tokio::time::timeout(Duration::from_millis(100), caller.recv_from(&mut buf))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_bye_during_ack_wait_is_remote_hangup() {
        let (mut dialog, caller, tx) = dialog(OFFER).await;
        dialog.trying().await.unwrap();
        dialog.ringing().await.unwrap();

        let bye = SipRequest::parse(
            b"BYE sip:echo@127.0.0.1 SIP/2.0\r\n\
              Via: SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bKbye\r\n\
              From: <sip:alice@127.0.0.1>;tag=alice1\r\n\
              To: <sip:echo@127.0.0.1>;tag=x\r\n\
              Call-ID: dialog-test\r\n\
              CSeq: 2 BYE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        tx.send(InDialogRequest {
            request: bye,
            source: caller.local_addr().unwrap(),
        })
        .await
        .unwrap();

        let err = dialog.answer().await.unwrap_err();
        assert!(matches!(err, SipError::RemoteHangup));
        assert!(dialog.remote_hung_up());

        assert_eq!(next_status(&caller).await, 100);
        assert_eq!(next_status(&caller).await, 180);
        assert_eq!(next_status(&caller).await, 200); // 200 OK to INVITE
        assert_eq!(next_status(&caller).await, 200); // 200 OK to BYE

        // Nothing to hang up after the remote did
        dialog.hangup().await.unwrap();
    }
}
