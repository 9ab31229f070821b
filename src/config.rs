//! Client and wait configuration.
//!
//! `ClientConfig` describes how to reach the cluster and is usually loaded
//! from a YAML file. Environment variables override file values:
//! - `SHARDKEEPER_HOSTS`: comma-separated base URLs
//! - `SHARDKEEPER_USERNAME` / `SHARDKEEPER_PASSWORD`: basic auth
//!
//! `WaitOptions` is the serialized form of a caller's "wait for completion"
//! request. Its integer `max_wait` (with `-1` meaning forever) only exists at
//! this edge and is turned into a [`WaitBudget`] before polling starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wait::WaitBudget;
use crate::{Error, Result};

const HOSTS_ENV: &str = "SHARDKEEPER_HOSTS";
const USERNAME_ENV: &str = "SHARDKEEPER_USERNAME";
const PASSWORD_ENV: &str = "SHARDKEEPER_PASSWORD";

/// Default cluster endpoint when nothing is configured
pub const DEFAULT_HOST: &str = "http://127.0.0.1:9200";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default master node timeout in seconds for destructive index operations
pub const DEFAULT_MASTER_TIMEOUT_SECS: u64 = 30;

/// Seconds between checks when waiting on shard relocation after an
/// allocation change
pub const DEFAULT_ALLOCATION_WAIT_INTERVAL_SECS: u64 = 3;

/// Seconds between checks for every other waitable operation
pub const DEFAULT_WAIT_INTERVAL_SECS: u64 = 9;

/// Connection settings for the cluster REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    /// Base URLs, tried in order when a connection cannot be established.
    pub hosts: Vec<String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Path to a PEM CA certificate used to verify the cluster.
    pub certificate: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub ssl_no_validate: bool,
    /// Master node timeout for index deletion, in seconds.
    pub master_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: vec![DEFAULT_HOST.to_string()],
            username: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            certificate: None,
            ssl_no_validate: false,
            master_timeout_secs: DEFAULT_MASTER_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("invalid client configuration: {}", e)))
    }

    /// Load a YAML file, apply environment overrides and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&data)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override file values from `SHARDKEEPER_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(HOSTS_ENV).ok(),
            std::env::var(USERNAME_ENV).ok(),
            std::env::var(PASSWORD_ENV).ok(),
        );
    }

    fn apply_overrides(
        &mut self,
        hosts: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) {
        if let Some(hosts) = hosts.filter(|h| !h.trim().is_empty()) {
            self.hosts = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.username = Some(username);
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.password = Some(password);
        }
    }

    /// Check the settings are usable before building a client.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::configuration("at least one host is required"));
        }
        for host in &self.hosts {
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(Error::configuration(format!(
                    "host must be in the form scheme://host:port, got '{}'",
                    host
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(Error::configuration("timeout_secs must be greater than 0"));
        }
        if self.username.is_some() && self.password.is_none() {
            return Err(Error::configuration(
                "username is set but password is missing",
            ));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Master node timeout used when a delete does not override it.
    pub fn master_timeout(&self) -> Duration {
        Duration::from_secs(self.master_timeout_secs)
    }
}

/// How long and how often to wait for an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitOptions {
    /// Block until the operation finishes.
    pub wait_for_completion: bool,
    /// Seconds between checks.
    pub wait_interval: u64,
    /// Maximum seconds to wait; `-1` waits forever.
    pub max_wait: i64,
}

impl WaitOptions {
    /// Options with the given interval, no budget limit and waiting enabled.
    pub fn waiting(wait_interval: u64) -> Self {
        Self {
            wait_for_completion: true,
            wait_interval,
            max_wait: -1,
        }
    }

    /// Options that return as soon as the request is accepted.
    pub fn no_wait(wait_interval: u64) -> Self {
        Self {
            wait_for_completion: false,
            wait_interval,
            max_wait: -1,
        }
    }

    /// Builder-style budget override.
    pub fn with_max_wait(mut self, max_wait: i64) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Convert the integer budget into a tagged [`WaitBudget`].
    ///
    /// `-1` is the only negative value accepted.
    pub fn budget(&self) -> Result<WaitBudget> {
        match self.max_wait {
            -1 => Ok(WaitBudget::Unbounded),
            secs if secs >= 0 => Ok(WaitBudget::Bounded(Duration::from_secs(secs as u64))),
            other => Err(Error::configuration(format!(
                "max_wait must be -1 (wait forever) or a non-negative number of seconds, got {}",
                other
            ))),
        }
    }
}
