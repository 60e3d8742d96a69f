use orabridge_core::err::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ConnectionKey;

/// Default number of rows fetched per remote round-trip
pub const DEFAULT_PREFETCH: u32 = 50;

/// Default truncation length for long/LOB columns when none is configured
pub const DEFAULT_MAX_LONG: u32 = 32767;

/// Default number of rows per batched INSERT round-trip
pub const DEFAULT_BATCH_SIZE: u32 = 1;

/// The connection config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// The remote server connect string
    pub connect_string: Option<String>,
    pub user: Option<String>,
    /// Never logged
    pub password: Option<String>,
    /// External auth token; when set, token auth is attempted instead of
    /// user/password
    pub token: Option<String>,
    /// Client locale used to configure the remote environment
    pub locale: Option<String>,
}

impl ConnectionConfig {
    pub fn parse(options: serde_json::Value) -> Result<Self> {
        serde_json::from_value(options).context("Failed to parse connection configuration options")
    }

    /// The cache matching key for this config.
    ///
    /// Absent and empty credential components are treated as equal.
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(
            self.connect_string.as_deref(),
            self.user.as_deref(),
            self.token.as_deref(),
        )
    }

    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

/// Per-table options resolved by the host catalog layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    pub schema: Option<String>,
    pub table: String,
    /// Rows per batched INSERT round-trip
    pub batch_size: Option<u32>,
    /// Rows fetched per round-trip during scans
    pub prefetch: Option<u32>,
    /// Truncation length applied to long/LOB columns during sampling reads
    pub max_long: Option<u32>,
    /// Table-wide default for per-column encoding strictness;
    /// individual columns can override
    pub strict_encoding: Option<bool>,
}

impl TableOptions {
    pub fn new(schema: Option<&str>, table: &str) -> Self {
        Self {
            schema: schema.map(|s| s.to_string()),
            table: table.to_string(),
            batch_size: None,
            prefetch: None,
            max_long: None,
            strict_encoding: None,
        }
    }

    pub fn parse(options: serde_json::Value) -> Result<Self> {
        serde_json::from_value(options).context("Failed to parse table options")
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn prefetch(&self) -> u32 {
        self.prefetch.unwrap_or(DEFAULT_PREFETCH)
    }

    pub fn max_long(&self) -> u32 {
        self.max_long.unwrap_or(DEFAULT_MAX_LONG)
    }
}
