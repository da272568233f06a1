//! Configuration management
//!
//! Everything here is built once at startup and handed down by value or
//! reference; nothing in the crate reads the environment after that.

use crate::infrastructure::media::codec::Codec;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_SIP_PORT: u16 = 5090;
pub const DEFAULT_LOCAL_RTP_PORT: u16 = 5004;
pub const DEFAULT_REMOTE_RTP_PORT: u16 = 5005;

/// Settings derived from environment variables
///
/// | variable                | field                   |
/// |-------------------------|-------------------------|
/// | `LOG_LEVEL`             | `log_level`             |
/// | `RTP_DEBUG`             | `rtp_debug`             |
/// | `RTCP_DEBUG`            | `rtcp_debug`            |
/// | `SIP_DEBUG`             | `sip_debug`             |
/// | `SIP_TRANSACTION_DEBUG` | `sip_transaction_debug` |
///
/// A toggle is on only when set to `true`; any other value leaves it off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub log_level: Option<String>,
    pub rtp_debug: Option<String>,
    pub rtcp_debug: Option<String>,
    pub sip_debug: Option<String>,
    pub sip_transaction_debug: Option<String>,
}

fn is_on(toggle: &Option<String>) -> bool {
    toggle
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

impl EnvConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    pub fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Log level, falling back to INFO when unset or unparseable
    pub fn level(&self) -> Level {
        self.log_level
            .as_deref()
            .and_then(|lvl| Level::from_str(lvl.trim()).ok())
            .unwrap_or(Level::INFO)
    }

    pub fn debug_flags(&self) -> DebugFlags {
        DebugFlags {
            rtp: is_on(&self.rtp_debug),
            rtcp: is_on(&self.rtcp_debug),
            sip: is_on(&self.sip_debug),
            sip_transaction: is_on(&self.sip_transaction_debug),
        }
    }
}

/// Verbose tracing toggles for the transport layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Log every RTP frame header
    pub rtp: bool,
    /// Log every RTCP packet
    pub rtcp: bool,
    /// Log raw SIP messages
    pub sip: bool,
    /// Log session state transitions
    pub sip_transaction: bool,
}

impl DebugFlags {
    /// Turn on media tracing (what `--debug` does for the relay)
    pub fn with_media(self) -> Self {
        Self {
            rtp: true,
            rtcp: true,
            ..self
        }
    }
}

/// Filter for the global subscriber; `force_debug` wins over `LOG_LEVEL`
pub fn log_filter(env: &EnvConfig, force_debug: bool) -> EnvFilter {
    let level = if force_debug { Level::DEBUG } else { env.level() };

    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy("")
}

/// Install the global tracing subscriber
pub fn init_logging(env: &EnvConfig, force_debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(env, force_debug))
        .with_target(false)
        .init();
}

/// PBX answer service configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbxConfig {
    pub listen: IpAddr,
    pub port: u16,
    pub debug: DebugFlags,
}

impl PbxConfig {
    pub fn sip_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }
}

impl Default for PbxConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_SIP_PORT,
            debug: DebugFlags::default(),
        }
    }
}

/// Packet echo relay configuration
///
/// Endpoints and codec are fixed for the lifetime of one relay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub codec: Codec,
    pub debug: DebugFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let mut map = config::Map::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        EnvConfig::from_source(config::Environment::default().source(Some(map))).unwrap()
    }

    #[test]
    fn test_empty_environment_defaults() {
        let cfg = env(&[]);
        assert_eq!(cfg, EnvConfig::default());
        assert_eq!(cfg.level(), Level::INFO);
        assert_eq!(cfg.debug_flags(), DebugFlags::default());
    }

    #[test]
    fn test_reads_toggles_and_level() {
        let cfg = env(&[
            ("LOG_LEVEL", "DEBUG"),
            ("RTP_DEBUG", "true"),
            ("SIP_DEBUG", "true"),
            ("SIP_TRANSACTION_DEBUG", "false"),
        ]);

        assert_eq!(cfg.level(), Level::DEBUG);
        let flags = cfg.debug_flags();
        assert!(flags.rtp);
        assert!(!flags.rtcp);
        assert!(flags.sip);
        assert!(!flags.sip_transaction);
    }

    #[test]
    fn test_non_boolean_toggles_are_off() {
        let cfg = env(&[
            ("RTP_DEBUG", "enabled"),
            ("RTCP_DEBUG", "1"),
            ("SIP_DEBUG", "TRUE"),
            ("SIP_TRANSACTION_DEBUG", ""),
        ]);

        let flags = cfg.debug_flags();
        assert!(!flags.rtp);
        assert!(!flags.rtcp);
        assert!(flags.sip);
        assert!(!flags.sip_transaction);
    }

    #[test]
    fn test_bad_level_falls_back_to_info() {
        let cfg = EnvConfig {
            log_level: Some("verbose".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.level(), Level::INFO);
    }

    #[test]
    fn test_log_filter_follows_level() {
        let cfg = env(&[("LOG_LEVEL", "warn")]);
        assert_eq!(log_filter(&cfg, false).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(&cfg, true).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter(&EnvConfig::default(), false).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }

    #[test]
    fn test_media_debug_override() {
        let flags = DebugFlags {
            sip: true,
            ..Default::default()
        }
        .with_media();
        assert!(flags.rtp && flags.rtcp && flags.sip);
        assert!(!flags.sip_transaction);
    }

    #[test]
    fn test_pbx_defaults() {
        let cfg = PbxConfig::default();
        assert_eq!(cfg.sip_addr(), "127.0.0.1:5090".parse().unwrap());
    }
}
