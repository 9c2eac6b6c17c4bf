use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Snapshot interval in seconds; `0` writes synchronously after every update.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot file; an empty path disables file persistence.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Load persisted metrics from the file or database at startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// When set, metrics are persisted to this database instead of the file.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Shared HMAC key for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
    /// Reject unsigned request bodies when a key is configured.
    #[serde(default)]
    pub require_signature: bool,
    /// Deadline for a single database statement, in milliseconds.
    #[serde(default = "default_db_op_timeout_ms")]
    pub db_op_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "metrics-db.json".to_string()
}

fn default_restore() -> bool {
    true
}

fn default_db_op_timeout_ms() -> u64 {
    1000
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_dsn: None,
            key: None,
            require_signature: false,
            db_op_timeout_ms: default_db_op_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
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

    /// Overrides fields from `ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH`,
    /// `RESTORE`, `DATABASE_DSN`, `KEY` and `REQUIRE_SIGNATURE`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = v.trim().parse().context("STORE_INTERVAL")?;
        }
        if let Some(path) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = path;
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = v.trim().parse().context("RESTORE")?;
        }
        if let Some(dsn) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(dsn);
        }
        if let Some(key) = lookup("KEY") {
            self.key = Some(key);
        }
        if let Some(v) = lookup("REQUIRE_SIGNATURE") {
            self.require_signature = v.trim().parse().context("REQUIRE_SIGNATURE")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        if self.require_signature && self.signing_key().is_none() {
            bail!("require_signature needs a key");
        }
        if self.db_op_timeout_ms == 0 {
            bail!("db_op_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn signing_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn database_dsn(&self) -> Option<&str> {
        self.database_dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty())
    }

    /// The DSN with any password replaced, for logging.
    pub fn redacted_dsn(&self) -> String {
        let Some(dsn) = self.database_dsn() else {
            return "-".to_string();
        };
        let Some((scheme, rest)) = dsn.split_once("://") else {
            return dsn.to_string();
        };
        match rest.split_once('@') {
            Some((userinfo, host)) => match userinfo.split_once(':') {
                Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
                None => dsn.to_string(),
            },
            None => dsn.to_string(),
        }
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn db_op_timeout(&self) -> Duration {
        Duration::from_millis(self.db_op_timeout_ms)
    }
}
