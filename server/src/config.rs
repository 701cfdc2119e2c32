//! Server configuration: CLI flags (via `clap`, `derive` + `env`) with
//! hardcoded defaults, following the same `Config::load()` two-step of
//! "parse CLI, then fall back to environment variables/defaults" — minus a
//! JSON chain-config file, which has no Bubble Protocol analogue.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;

fn default_port() -> u16 {
    8080
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

/// CLI arguments and environment-variable fallbacks for the Guardian server.
#[derive(Parser, Debug, Clone)]
#[command(name = "bubble-guardian-server")]
#[command(about = "Bubble Protocol Guardian reference server")]
pub struct GuardianConfig {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "HOST", default_value_t = default_host())]
    pub host: IpAddr,

    /// Port to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "PORT", default_value_t = default_port())]
    pub port: u16,

    /// Chain id this deployment's `BlockchainProvider` answers for; requests
    /// declaring any other `chainId` are rejected with `BLOCKCHAIN_NOT_SUPPORTED`.
    #[arg(long, env = "CHAIN_ID", default_value_t = 1)]
    pub chain_id: u64,

    /// The provider URL advertised in `ContentId`s this server mints.
    #[arg(long, env = "PROVIDER_URL", default_value = "https://bubble.example.com/")]
    pub provider_url: String,

    /// Accepted clock skew between a request's `timestamp` and server time,
    /// in milliseconds.
    #[arg(long, env = "REPLAY_SKEW_MS", default_value_t = 300_000)]
    pub replay_skew_ms: u64,

    /// Per-request send/receive timeout, in milliseconds.
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 3_000)]
    pub request_timeout_ms: u64,

    /// WebSocket ping interval, in seconds. Defaults to one hour per the
    /// protocol's own heartbeat cadence.
    #[arg(long, env = "WS_HEARTBEAT_SECS", default_value_t = 3_600)]
    pub ws_heartbeat_secs: u64,
}

impl GuardianConfig {
    /// Parses CLI arguments, falling back to environment variables and then
    /// the hardcoded defaults above — `clap`'s `env` feature resolves the
    /// fallback chain per-field, so there is no separate file-load step.
    pub fn load() -> Self {
        GuardianConfig::parse()
    }

    pub fn replay_skew(&self) -> Duration {
        Duration::from_millis(self.replay_skew_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ws_heartbeat(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_secs)
    }
}
