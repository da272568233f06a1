use anyhow::Context;
use cipbx::application::EchoAnswerHandler;
use cipbx::config::{init_logging, EnvConfig, PbxConfig, DEFAULT_SIP_PORT};
use cipbx::infrastructure::protocols::sip::{SipServer, SipServerConfig};
use clap::Parser;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Answer every inbound SIP call and echo its audio
#[derive(Parser, Debug)]
#[command(name = "cipbx", version, about)]
struct Args {
    /// Address to listen on for SIP
    #[arg(short, long, default_value = "127.0.0.1")]
    listen: IpAddr,

    /// SIP port
    #[arg(short, long, default_value_t = DEFAULT_SIP_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env = EnvConfig::from_env().context("Failed to read environment configuration")?;
    init_logging(&env, false);

    let config = PbxConfig {
        listen: args.listen,
        port: args.port,
        debug: env.debug_flags(),
    };

    info!("Starting cipbx");

    let server = SipServer::bind(SipServerConfig::from(&config))
        .await
        .with_context(|| format!("Failed to listen on {}", config.sip_addr()))?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server.serve(cancel, Arc::new(EchoAnswerHandler)).await?;
    server.wait_sessions().await;

    info!("cipbx stopped");
    Ok(())
}
