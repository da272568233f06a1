//! Packet echo relay
//!
//! Receives datagrams on a local socket and forwards each one, byte for
//! byte, through a second socket connected to a fixed remote endpoint.
//! Any receive or send failure ends the relay; there is no retry.

use super::echo::EchoStats;
use super::transport::MTU;
use crate::config::{DebugFlags, RelayConfig};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Every Nth packet produces a progress line
pub const PROGRESS_INTERVAL: u64 = 10;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to create RTP listener: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to create send connection: {0}")]
    Connect(#[source] io::Error),

    #[error("failed to read RTP packet: {0}")]
    Receive(#[source] io::Error),

    #[error("failed to echo RTP packet: {0}")]
    Send(#[source] io::Error),

    #[error("echo task ended without reporting")]
    TaskLost,
}

/// True for packet counts 10, 20, 30, ...
pub fn is_progress_tick(count: u64) -> bool {
    count > 0 && count % PROGRESS_INTERVAL == 0
}

/// Relay with both sockets open, ready to run
pub struct PacketEchoRelay {
    config: RelayConfig,
    recv_socket: UdpSocket,
    send_socket: UdpSocket,
}

impl PacketEchoRelay {
    /// Open the receive socket and the connected send socket
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let recv_socket = UdpSocket::bind(config.local)
            .await
            .map_err(RelayError::Bind)?;

        let unspecified = match config.remote.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let send_socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))
            .await
            .map_err(RelayError::Connect)?;
        send_socket
            .connect(config.remote)
            .await
            .map_err(RelayError::Connect)?;

        info!(
            listen_addr = %recv_socket.local_addr().map_err(RelayError::Bind)?,
            send_addr = %config.remote,
            codec = config.codec.name,
            "RTP Echo Server started"
        );

        Ok(Self {
            config,
            recv_socket,
            send_socket,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.recv_socket.local_addr()
    }

    /// Run until `cancel` fires (clean) or an I/O error occurs (fatal)
    ///
    /// The receive loop runs in its own task and reports back through a
    /// single-slot channel. Both sockets are closed when that task ends.
    pub async fn run(self, cancel: CancellationToken) -> Result<EchoStats, RelayError> {
        let Self {
            config,
            recv_socket,
            send_socket,
        } = self;
        let (done_tx, mut done_rx) = oneshot::channel();
        let loop_cancel = cancel.clone();

        tokio::spawn(async move {
            let result = Self::receive_loop(
                recv_socket,
                send_socket,
                config.remote,
                config.debug,
                loop_cancel,
            )
            .await;
            let _ = done_tx.send(result);
        });

        let result = tokio::select! {
            biased;
            result = &mut done_rx => result,
            _ = cancel.cancelled() => {
                info!("Shutting down RTP echo server");
                // The loop watches the same token, so this resolves promptly
                done_rx.await
            }
        };

        match result {
            Ok(Ok(stats)) => {
                info!(packets = stats.packets, bytes = stats.bytes, "Echo completed");
                Ok(stats)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RelayError::TaskLost),
        }
    }

    async fn receive_loop(
        recv_socket: UdpSocket,
        send_socket: UdpSocket,
        remote: SocketAddr,
        debug: DebugFlags,
        cancel: CancellationToken,
    ) -> Result<EchoStats, RelayError> {
        let mut buffer = vec![0u8; MTU];
        let mut stats = EchoStats::default();

        if let Ok(addr) = recv_socket.local_addr() {
            info!(listen_addr = %addr, "Waiting for RTP packets");
        }
        info!(send_addr = %remote, "Will echo to");

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Context cancelled, stopping echo");
                    return Ok(stats);
                }
                received = recv_socket.recv_from(&mut buffer) => received,
            };

            let (size, peer) = match received {
                Ok(r) => r,
                Err(e) => {
                    error!("Failed to read RTP packet: {}", e);
                    return Err(RelayError::Receive(e));
                }
            };

            stats.record(size);
            let tick = is_progress_tick(stats.packets);
            if tick {
                info!(count = stats.packets, bytes = size, from = %peer, "RTP packets received");
            }
            if debug.rtp {
                debug!("Relaying {} bytes from {} to {}", size, peer, remote);
            }

            if let Err(e) = send_socket.send(&buffer[..size]).await {
                error!("Failed to echo RTP packet: {}", e);
                return Err(RelayError::Send(e));
            }

            if tick {
                info!(to = %remote, "RTP packet echoed");
            }
        }
    }
}
