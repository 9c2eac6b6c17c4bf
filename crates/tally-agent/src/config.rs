use anyhow::{bail, Context};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector address, `host:port` or a full `http(s)://` URL.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Worker count, i.e. the number of reports/collections that may run at once.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared HMAC key; signing is disabled when unset.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_delivery_attempts")]
    pub delivery_attempts: u32,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_request_timeout() -> u64 {
    5
}

fn default_delivery_attempts() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
            request_timeout_secs: default_request_timeout(),
            delivery_attempts: default_delivery_attempts(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the file if given, then applies environment overrides and validates.
    pub fn from_sources(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path).with_context(|| format!("loading {path}"))?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`,
    /// `RATE_LIMIT` and `KEY`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(address) = lookup("ADDRESS") {
            self.server_address = address;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = v.trim().parse().context("POLL_INTERVAL")?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = v.trim().parse().context("REPORT_INTERVAL")?;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            self.rate_limit = v.trim().parse().context("RATE_LIMIT")?;
        }
        if let Some(key) = lookup("KEY") {
            self.key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_address.trim().is_empty() {
            bail!("server_address must not be empty");
        }
        if self.poll_interval_secs == 0 || self.report_interval_secs == 0 {
            bail!("poll and report intervals must be positive");
        }
        if self.rate_limit == 0 {
            bail!("rate_limit must be at least 1");
        }
        Ok(())
    }

    /// Signing key, with an empty string treated as unset.
    pub fn signing_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    /// Base URL of the collector, without a trailing slash.
    pub fn base_url(&self) -> String {
        let addr = self.server_address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
