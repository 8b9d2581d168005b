use std::time::Duration;

use http_forwarder::{UpstreamTarget, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Environment variable naming the upstream host.
pub const HOST_VAR: &str = "LOAD_BALANCER_DNS_NAME";
/// Optional environment variable bounding one upstream exchange, in milliseconds.
pub const TIMEOUT_VAR: &str = "UPSTREAM_TIMEOUT_MS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LOAD_BALANCER_DNS_NAME is not set")]
    MissingHost,
    #[error("UPSTREAM_TIMEOUT_MS must be a whole number of milliseconds, got `{0}`")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Host every event is forwarded to. There is no default.
    upstream_host: String,
    /// Upstream port. The environment never changes it.
    #[serde(default = "default_port")]
    upstream_port: u16,
    /// Bound on one upstream exchange. Absent means wait indefinitely.
    #[serde(default)]
    timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Config {
    pub fn new(upstream_host: impl Into<String>) -> Self {
        Self {
            upstream_host: upstream_host.into(),
            upstream_port: DEFAULT_PORT,
            timeout_ms: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let upstream_host = lookup(HOST_VAR)
            .filter(|host| !host.trim().is_empty())
            .ok_or(ConfigError::MissingHost)?;

        let mut config = Self::new(upstream_host);

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;

            config = config.timeout_ms(millis);
        }

        Ok(config)
    }

    pub fn upstream_port(mut self, value: u16) -> Self {
        self.upstream_port = value;

        self
    }

    pub fn timeout_ms(mut self, value: u64) -> Self {
        self.timeout_ms = Some(value);

        self
    }

    pub fn upstream_host(&self) -> &str {
        &self.upstream_host
    }

    pub fn target(&self) -> UpstreamTarget {
        let target = UpstreamTarget::new(self.upstream_host.clone()).port(self.upstream_port);

        match self.timeout_ms {
            Some(millis) => target.timeout(Duration::from_millis(millis)),
            None => target,
        }
    }
}
