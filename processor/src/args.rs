use clap::Parser;
use rwp_common::retry::RetryStrategy;
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "remote-work-processor", version)]
pub struct Options {
    /// Run in standalone mode, without wiring the Kubernetes watch manager
    #[arg(long = "standalone-mode", default_value_t = false)]
    pub standalone_mode: bool,

    /// Instance identifier for the session identity
    #[arg(long = "instance-id", default_value_t = hashed_hostname())]
    pub instance_id: String,

    /// Number of attempts for establishing the AutoPi session
    #[arg(long = "conn-retries", default_value_t = 6)]
    pub conn_retries: u32,

    /// Base interval between connection attempts (e.g. 10s, 1m)
    #[arg(long = "retry-interval", default_value = "10s", value_parser = parse_interval)]
    pub retry_interval: Duration,

    /// Backoff mode between connection attempts
    #[arg(long = "retry-strategy", value_enum, default_value_t = RetryStrategy::Fixed)]
    pub retry_strategy: RetryStrategy,
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    parse_duration::parse(value).map_err(|err| err.to_string())
}

/// SHA-256 hex of the host name, so the default instance id carries no
/// recognizable host information.
fn hashed_hostname() -> String {
    let hostname = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hex::encode(hasher.finalize())
}
