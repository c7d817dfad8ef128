use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, StatsdError};
use crate::statsd::encoder::{self, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_PREFIX};

// ─── Environment ─────────────────────────────────────────────────

/// Collector host. Its presence is what turns the pipeline on.
pub const ENV_HOST: &str = "VLLM_STATSD_HOST";
/// Collector port, optional.
pub const ENV_PORT: &str = "VLLM_STATSD_PORT";

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_UDP_PAYLOAD: usize = 65_507;
const MIN_PAYLOAD: usize = 64;

// ─── Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatsdConfig {
    /// Collector hostname or IP
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Namespace prepended to every metric name
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Upper bound for one datagram
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Write timeout on the socket
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Minimum gap between two transport-failure warnings
    #[serde(default = "default_error_log_interval_secs")]
    pub error_log_interval_secs: u64,
}

fn default_port() -> u16 {
    8125
}
fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}
fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}
fn default_send_timeout_ms() -> u64 {
    50
}
fn default_error_log_interval_secs() -> u64 {
    10
}

impl StatsdConfig {
    /// Defaults for everything but the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            prefix: default_prefix(),
            max_payload_bytes: default_max_payload_bytes(),
            send_timeout_ms: default_send_timeout_ms(),
            error_log_interval_secs: default_error_log_interval_secs(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Read activation from the process environment.
    ///
    /// `Ok(None)` means the pipeline is switched off; a malformed value is an
    /// error so a typo does not silently disable metrics.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StatsdConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup(ENV_HOST) else {
            return Ok(None);
        };

        let mut config = Self::new(host.trim());
        if let Some(raw) = lookup(ENV_PORT) {
            config.port = raw.trim().parse().map_err(|_| {
                StatsdError::Config(format!("{ENV_PORT} must be a port number, got '{raw}'"))
            })?;
        }

        config.validate()?;
        Ok(Some(config))
    }

    /// Reject values that would make the emitter unusable.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StatsdError::Config(format!("{ENV_HOST} is set but empty")));
        }
        if self.port == 0 {
            return Err(StatsdError::Config("port must be between 1 and 65535".into()));
        }
        if self.prefix.is_empty() || encoder::sanitize(&self.prefix) != self.prefix {
            return Err(StatsdError::Config(format!(
                "prefix '{}' must be non-empty and free of ':', '|', '@' and whitespace",
                self.prefix
            )));
        }
        if !(MIN_PAYLOAD..=MAX_UDP_PAYLOAD).contains(&self.max_payload_bytes) {
            return Err(StatsdError::Config(format!(
                "max_payload_bytes must be between {MIN_PAYLOAD} and {MAX_UDP_PAYLOAD}"
            )));
        }
        if self.send_timeout_ms == 0 {
            return Err(StatsdError::Config("send_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_secs(self.error_log_interval_secs)
    }
}
