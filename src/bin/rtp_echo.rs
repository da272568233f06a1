use cipbx::config::{
    init_logging, EnvConfig, RelayConfig, DEFAULT_LOCAL_RTP_PORT, DEFAULT_REMOTE_RTP_PORT,
};
use cipbx::infrastructure::media::{Codec, PacketEchoRelay};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Echo every received RTP packet to a fixed remote endpoint
#[derive(Parser, Debug)]
#[command(name = "rtp-echo", version, about)]
struct Args {
    /// Local IP address to listen on
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    local_ip: String,

    /// Local port to listen on
    #[arg(short = 'p', long, default_value_t = DEFAULT_LOCAL_RTP_PORT)]
    local_port: u16,

    /// Remote IP address to echo to
    #[arg(short = 'r', long, default_value = "127.0.0.1")]
    remote_ip: String,

    /// Remote port to echo to
    #[arg(short = 'P', long, default_value_t = DEFAULT_REMOTE_RTP_PORT)]
    remote_port: u16,

    /// Codec (PCMA, PCMU, OPUS)
    #[arg(short = 'c', long, default_value = "PCMA")]
    codec: String,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

fn parse_ip(value: &str, what: &str) -> Option<IpAddr> {
    match value.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            error!("Invalid {} IP address: {}", what, value);
            None
        }
    }
}

/// Validate everything before any socket is opened
fn relay_config(args: &Args, env: &EnvConfig) -> Option<RelayConfig> {
    let local_ip = parse_ip(&args.local_ip, "local")?;
    let remote_ip = parse_ip(&args.remote_ip, "remote")?;

    let codec: Codec = match args.codec.parse() {
        Ok(codec) => codec,
        Err(e) => {
            error!("{}", e);
            return None;
        }
    };

    let debug = if args.debug {
        env.debug_flags().with_media()
    } else {
        env.debug_flags()
    };

    Some(RelayConfig {
        local: SocketAddr::new(local_ip, args.local_port),
        remote: SocketAddr::new(remote_ip, args.remote_port),
        codec,
        debug,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Failed to read environment configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&env, args.debug);

    let Some(config) = relay_config(&args, &env) else {
        return ExitCode::FAILURE;
    };

    info!(
        codec = config.codec.name,
        payload_type = config.codec.payload_type,
        sample_rate = config.codec.sample_rate,
        frame_ms = config.codec.sample_duration.as_millis() as u64,
        "Using codec"
    );

    let relay = match PacketEchoRelay::bind(config).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    match relay.run(cancel).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("RTP echo server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
