//! Command-line and environment configuration for the relay.
//!
//! Every setting has a flag, most have an environment override, and all
//! have a default. [`Args::into_config`] validates the raw values into a
//! [`RelayConfig`]; an invalid filter mode, a zero capacity/interval or a
//! buffer larger than [`MAX_BUFFER_CAPACITY`] is a startup error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use nozzle_core::{Error, FilterMode, Result};

use crate::session::SessionConfig;
use crate::upstream::DopplerConfig;

/// Largest accepted `--queue-capacity` / `--upstream-buffer`.
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

#[derive(Parser, Debug)]
#[command(name = "nozzle-relay")]
#[command(
    version,
    about = "Nozzle relay server - filtered Loggregator firehose over WebSocket"
)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Doppler WebSocket endpoint.
    #[arg(
        long,
        env = "DOPPLER_ENDPOINT",
        default_value = "wss://doppler.cf.bosh-lite.com:443"
    )]
    pub doppler_endpoint: String,

    /// Skip verification of the Doppler TLS certificate.
    #[arg(long, env = "SKIP_SSL_VALIDATION")]
    pub skip_ssl_validation: bool,

    /// Enable debug logging and the periodic kept/discarded summary.
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Filter strategy: `allow-list` or `deny-list`.
    #[arg(long, env = "FILTER_MODE", default_value = "deny-list")]
    pub filter_mode: String,

    /// Capacity of each session's queue between filter and downstream writer.
    #[arg(long, default_value_t = crate::pipeline::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Capacity of each subscription's upstream event buffer.
    #[arg(long, default_value_t = 100)]
    pub upstream_buffer: usize,

    /// Seconds without upstream data before the connection is considered dead.
    #[arg(long, default_value_t = 30)]
    pub idle_timeout: u64,

    /// Upstream reconnect attempts after a transport failure.
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// Seconds between kept/discarded summaries.
    #[arg(long, default_value_t = 30)]
    pub report_interval: u64,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    pub log_json: bool,
}

/// Validated relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub filter_mode: FilterMode,
    pub debug: bool,
    pub log_json: bool,
    pub report_interval: Duration,
    pub session: SessionConfig,
    pub doppler: DopplerConfig,
}

impl Args {
    pub fn into_config(self) -> Result<RelayConfig> {
        let filter_mode: FilterMode = self.filter_mode.parse()?;
        let queue_capacity = require_capacity(self.queue_capacity, "queue-capacity")?;
        let upstream_buffer = require_capacity(self.upstream_buffer, "upstream-buffer")?;
        let idle_timeout = require_non_zero(self.idle_timeout, "idle-timeout")?;
        let report_interval = require_non_zero(self.report_interval, "report-interval")?;

        Ok(RelayConfig {
            listen: SocketAddr::new(self.bind, self.port),
            filter_mode,
            debug: self.debug,
            log_json: self.log_json,
            report_interval: Duration::from_secs(report_interval),
            session: SessionConfig { queue_capacity },
            doppler: DopplerConfig {
                endpoint: self.doppler_endpoint,
                skip_ssl_validation: self.skip_ssl_validation,
                idle_timeout: Duration::from_secs(idle_timeout),
                buffer_size: upstream_buffer,
                max_retries: self.max_retries,
                ..DopplerConfig::default()
            },
        })
    }
}

fn require_non_zero<T: Default + PartialEq>(value: T, flag: &str) -> Result<T> {
    if value == T::default() {
        return Err(Error::Config(format!("--{flag} must be greater than zero")));
    }
    Ok(value)
}

fn require_capacity(value: usize, flag: &str) -> Result<usize> {
    let value = require_non_zero(value, flag)?;
    if value > MAX_BUFFER_CAPACITY {
        return Err(Error::Config(format!(
            "--{flag} must be at most {MAX_BUFFER_CAPACITY}"
        )));
    }
    Ok(value)
}
