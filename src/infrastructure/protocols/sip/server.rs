//! SIP server implementation
//!
//! Accepts INVITEs on one UDP socket and runs each as its own dialog task.
//! Requests for a known Call-ID are routed to that dialog; a small set of
//! out-of-dialog requests is answered directly.

use super::builder::ResponseBuilder;
use super::dialog::{DialogServerSession, InDialogRequest};
use super::handler::{InboundDialog, SessionHandler};
use super::message::{SipError, SipMessage, SipMethod, SipRequest};
use super::transport::{UdpTransport, MAX_DATAGRAM};
use crate::config::{DebugFlags, PbxConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pending in-dialog requests per dialog before new ones are dropped
const DIALOG_QUEUE: usize = 32;

type DialogMap = Arc<RwLock<HashMap<String, mpsc::Sender<InDialogRequest>>>>;

/// SIP server configuration
#[derive(Debug, Clone, Copy)]
pub struct SipServerConfig {
    pub bind: SocketAddr,
    pub debug: DebugFlags,
}

impl From<&PbxConfig> for SipServerConfig {
    fn from(config: &PbxConfig) -> Self {
        Self {
            bind: config.sip_addr(),
            debug: config.debug,
        }
    }
}

/// SIP server
pub struct SipServer {
    config: SipServerConfig,
    transport: Arc<UdpTransport>,
    dialogs: DialogMap,
    sessions: TaskTracker,
}

impl SipServer {
    /// Bind the signaling socket; failure here is fatal for the caller
    pub async fn bind(config: SipServerConfig) -> Result<Self, SipError> {
        let transport = UdpTransport::bind(config.bind, config.debug).await?;

        Ok(Self {
            config,
            transport: Arc::new(transport),
            dialogs: Arc::new(RwLock::new(HashMap::new())),
            sessions: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SipError> {
        self.transport.local_addr()
    }

    /// Number of dialogs currently running
    pub async fn active_dialogs(&self) -> usize {
        self.dialogs.read().await.len()
    }

    /// Accept sessions until `cancel` fires
    ///
    /// Running sessions keep going after this returns; they watch child
    /// tokens of `cancel` and end on their own. Use [`SipServer::wait_sessions`]
    /// to wait for them.
    pub async fn serve(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<(), SipError> {
        info!("SIP server started on {}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let incoming = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("SIP server stopped accepting sessions");
                    return Ok(());
                }
                incoming = self.transport.recv(&mut buf) => incoming,
            };

            let incoming = match incoming {
                Ok(Some(incoming)) => incoming,
                Ok(None) => continue,
                Err(e) => {
                    error!("SIP transport failed: {}", e);
                    return Err(e);
                }
            };

            match incoming.message {
                SipMessage::Request(request) => {
                    if let Err(e) = self
                        .dispatch(request, incoming.source, &cancel, &handler)
                        .await
                    {
                        warn!("Error processing request from {}: {}", incoming.source, e);
                    }
                }
                SipMessage::Response(response) => {
                    debug!("Received SIP response: {}", response.status_code());
                }
            }
        }
    }

    /// Wait until every session task has finished
    pub async fn wait_sessions(&self) {
        self.sessions.close();
        self.sessions.wait().await;
    }

    async fn dispatch(
        &self,
        request: SipRequest,
        source: SocketAddr,
        cancel: &CancellationToken,
        handler: &Arc<dyn SessionHandler>,
    ) -> Result<(), SipError> {
        let Some(call_id) = request.call_id() else {
            warn!("Dropping {} without Call-ID from {}", request.method_name(), source);
            return Ok(());
        };

        let request = match self.route(&call_id, request, source).await {
            Some(request) => request,
            None => return Ok(()),
        };

        match request.method() {
            Some(SipMethod::Invite) => {
                self.start_dialog(call_id, request, source, cancel, handler)
                    .await
            }
            Some(SipMethod::Options) => self.respond(ResponseBuilder::ok(), &request, source).await,
            Some(SipMethod::Ack) => {
                debug!("Dropping ACK for unknown dialog {}", call_id);
                Ok(())
            }
            Some(SipMethod::Bye) | Some(SipMethod::Cancel) => {
                self.respond(ResponseBuilder::call_does_not_exist(), &request, source)
                    .await
            }
            _ => {
                warn!("No handler for method: {}", request.method_name());
                self.respond(ResponseBuilder::not_implemented(), &request, source)
                    .await
            }
        }
    }

    /// Hand the request to its dialog, or give it back if there is none
    async fn route(
        &self,
        call_id: &str,
        request: SipRequest,
        source: SocketAddr,
    ) -> Option<SipRequest> {
        let sender = match self.dialogs.read().await.get(call_id) {
            Some(sender) => sender.clone(),
            None => return Some(request),
        };

        match sender.try_send(InDialogRequest { request, source }) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => {
                warn!("Dialog {} is not keeping up, dropping request", call_id);
                None
            }
            // Dialog is finishing; treat as unknown
            Err(TrySendError::Closed(incoming)) => Some(incoming.request),
        }
    }

    async fn respond(
        &self,
        builder: ResponseBuilder,
        request: &SipRequest,
        destination: SocketAddr,
    ) -> Result<(), SipError> {
        let response = builder.build_for_request(request)?;
        self.transport.send(&response.to_bytes(), destination).await
    }

    async fn start_dialog(
        &self,
        call_id: String,
        request: SipRequest,
        source: SocketAddr,
        cancel: &CancellationToken,
        handler: &Arc<dyn SessionHandler>,
    ) -> Result<(), SipError> {
        let (tx, rx) = mpsc::channel(DIALOG_QUEUE);
        let dialog = DialogServerSession::new(
            request,
            source,
            self.transport.clone(),
            rx,
            cancel.child_token(),
            self.config.debug,
        )?;

        self.dialogs.write().await.insert(call_id.clone(), tx);
        info!(id = %dialog.id(), from = %source, "New dialog request");

        let dialogs = self.dialogs.clone();
        let handler = handler.clone();
        self.sessions.spawn(async move {
            // A panicking session must not leave its Call-ID routed
            if let Err(e) = tokio::spawn(Self::run_session(handler, dialog)).await {
                error!(call_id = %call_id, "Session task failed: {}", e);
            }
            dialogs.write().await.remove(&call_id);
        });

        Ok(())
    }

    async fn run_session(handler: Arc<dyn SessionHandler>, mut dialog: DialogServerSession) {
        handler.handle(&mut dialog).await;

        if let Err(e) = dialog.hangup().await {
            warn!(id = %dialog.id(), "Failed to send BYE: {}", e);
        }

        info!(id = %dialog.id(), state = %dialog.state(), "Dialog finished");
    }
}
