/// Engine configuration
///
/// `EngineConfig` is the full option set the engine's connection factory captures.
/// It deserializes from any serde format; absent fields take the documented
/// defaults, and `validate` enforces the flags the executor relies on.
use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SLOW_QUERY_MS,
    MIN_ENCRYPTION_KEY_LEN,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Connection mode
///
/// Determines how the connection is established and what capabilities are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Local SQLite database file
    #[default]
    Local,
    /// Direct connection to remote LibSQL/Turso server
    Remote,
    /// Local replica with remote sync
    RemoteReplica,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        crate::decode::decode_mode(s)
            .ok_or_else(|| Error::Configuration(format!("unknown connection mode `{s}`")))
    }
}

/// Options captured by the engine's connection factory.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How to reach the database.
    #[serde(default)]
    pub mode: Mode,

    /// Path to the local database file (local and remote replica modes).
    #[serde(default)]
    pub database: Option<String>,

    /// Remote database URL (remote and remote replica modes).
    #[serde(default)]
    pub url: Option<String>,

    /// Remote authentication token.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Encryption key for encryption at rest (local and remote replica modes).
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Timeout for establishing a physical connection, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// SQLite busy timeout applied to each new connection, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Default per-statement timeout, in milliseconds. None waits indefinitely.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,

    /// Statements slower than this are logged at warn level, in milliseconds.
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,

    /// Must stay false: commits are issued by the executor.
    #[serde(default)]
    pub autocommit: bool,

    /// Must stay true: results are buffered so a connection can be reused.
    #[serde(default = "default_buffered")]
    pub buffered: bool,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_slow_query_ms() -> u64 {
    DEFAULT_SLOW_QUERY_MS
}

fn default_buffered() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: Mode::Local,
            database: None,
            url: None,
            auth_token: None,
            encryption_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
            statement_timeout_ms: None,
            slow_query_ms: default_slow_query_ms(),
            autocommit: false,
            buffered: default_buffered(),
        }
    }
}

impl EngineConfig {
    /// Configuration for a local database file.
    pub fn local(database: impl Into<String>) -> Self {
        EngineConfig {
            mode: Mode::Local,
            database: Some(database.into()),
            ..Default::default()
        }
    }

    /// Configuration for a remote LibSQL server.
    pub fn remote(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        EngineConfig {
            mode: Mode::Remote,
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            ..Default::default()
        }
    }

    /// Configuration for a local replica synced with a remote server.
    pub fn remote_replica(
        database: impl Into<String>,
        url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        EngineConfig {
            mode: Mode::RemoteReplica,
            database: Some(database.into()),
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            ..Default::default()
        }
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_ms = duration_ms(threshold);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }

    /// Check that the options describe a usable, executor-compatible engine.
    pub fn validate(&self) -> Result<()> {
        if self.autocommit {
            return Err(Error::Configuration(
                "autocommit must be disabled; commits are issued by the executor".to_string(),
            ));
        }
        if !self.buffered {
            return Err(Error::Configuration(
                "buffered cursors are required".to_string(),
            ));
        }

        let needs_database = matches!(self.mode, Mode::Local | Mode::RemoteReplica);
        let needs_remote = matches!(self.mode, Mode::Remote | Mode::RemoteReplica);

        if needs_database && is_blank(self.database.as_deref()) {
            return Err(Error::Configuration(format!(
                "`database` is required in {:?} mode",
                self.mode
            )));
        }
        if needs_remote && is_blank(self.url.as_deref()) {
            return Err(Error::Configuration(format!(
                "`url` is required in {:?} mode",
                self.mode
            )));
        }
        if needs_remote && self.auth_token.is_none() {
            return Err(Error::Configuration(format!(
                "`auth_token` is required in {:?} mode",
                self.mode
            )));
        }

        if let Some(key) = &self.encryption_key {
            if self.mode == Mode::Remote {
                return Err(Error::Configuration(
                    "encryption at rest is not available for remote connections".to_string(),
                ));
            }
            if key.len() < MIN_ENCRYPTION_KEY_LEN {
                return Err(Error::Configuration(format!(
                    "encryption key must be at least {MIN_ENCRYPTION_KEY_LEN} characters"
                )));
            }
        }

        Ok(())
    }
}

// Secrets stay out of logs.
impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("mode", &self.mode)
            .field("database", &self.database)
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("slow_query_ms", &self.slow_query_ms)
            .field("autocommit", &self.autocommit)
            .field("buffered", &self.buffered)
            .finish()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
