//! # Configuration Module
//!
//! Timeouts, limits and the listen backlog for server and client sessions.
//!
//! ## Overview
//!
//! Configuration comes from an optional YAML file, then environment variables
//! override individual fields. Every field has a default, so an empty file (or
//! no file at all) yields a working configuration.
//!
//! ```yaml
//! server:
//!   backlog: 64
//!   read_timeout_ms: 30000
//! client:
//!   connect_timeout_ms: 2000
//! ```
//!
//! A timeout of `0` disables that deadline.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SIESTA_BACKLOG` | `server.backlog` |
//! | `SIESTA_SERVER_READ_TIMEOUT_MS` | `server.read_timeout_ms` |
//! | `SIESTA_SERVER_WRITE_TIMEOUT_MS` | `server.write_timeout_ms` |
//! | `SIESTA_SERVER_MAX_HEADER_BYTES` | `server.max_header_bytes` |
//! | `SIESTA_SERVER_MAX_BODY_BYTES` | `server.max_body_bytes` |
//! | `SIESTA_CLIENT_RESOLVE_TIMEOUT_MS` | `client.resolve_timeout_ms` |
//! | `SIESTA_CLIENT_CONNECT_TIMEOUT_MS` | `client.connect_timeout_ms` |
//! | `SIESTA_CLIENT_WRITE_TIMEOUT_MS` | `client.write_timeout_ms` |
//! | `SIESTA_CLIENT_READ_TIMEOUT_MS` | `client.read_timeout_ms` |
//! | `SIESTA_CLIENT_MAX_HEADER_BYTES` | `client.max_header_bytes` |
//! | `SIESTA_CLIENT_MAX_BODY_BYTES` | `client.max_body_bytes` |
//!
//! Unparseable values are ignored with a warning.
//!
//! ## Usage
//!
//! ```rust
//! use siesta::config::SiestaConfig;
//!
//! let config = SiestaConfig::from_yaml_str("server:\n  backlog: 128\n").unwrap();
//! assert_eq!(config.server.backlog, 128);
//! assert_eq!(config.client.connect_timeout_ms, 5_000);
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::codec::Limits;

const DEFAULT_MAX_HEADER_BYTES: usize = 16 * 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiestaConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Acceptor and server session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Deadline for reading one complete request.
    pub read_timeout_ms: u64,
    /// Deadline for writing one complete response.
    pub write_timeout_ms: u64,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: 64,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Client session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub resolve_timeout_ms: u64,
    /// Applied to each resolved address in turn.
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            write_timeout_ms: 30_000,
            read_timeout_ms: 30_000,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn resolve_timeout(&self) -> Option<Duration> {
        millis(self.resolve_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl SiestaConfig {
    /// Parse YAML. Missing sections and fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML for this shape.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse siesta config")
    }

    /// Defaults overridden by `SIESTA_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = &mut self.server;
        override_from(&lookup, "SIESTA_BACKLOG", &mut server.backlog);
        override_from(&lookup, "SIESTA_SERVER_READ_TIMEOUT_MS", &mut server.read_timeout_ms);
        override_from(&lookup, "SIESTA_SERVER_WRITE_TIMEOUT_MS", &mut server.write_timeout_ms);
        override_from(&lookup, "SIESTA_SERVER_MAX_HEADER_BYTES", &mut server.max_header_bytes);
        override_from(&lookup, "SIESTA_SERVER_MAX_BODY_BYTES", &mut server.max_body_bytes);

        let client = &mut self.client;
        override_from(&lookup, "SIESTA_CLIENT_RESOLVE_TIMEOUT_MS", &mut client.resolve_timeout_ms);
        override_from(&lookup, "SIESTA_CLIENT_CONNECT_TIMEOUT_MS", &mut client.connect_timeout_ms);
        override_from(&lookup, "SIESTA_CLIENT_WRITE_TIMEOUT_MS", &mut client.write_timeout_ms);
        override_from(&lookup, "SIESTA_CLIENT_READ_TIMEOUT_MS", &mut client.read_timeout_ms);
        override_from(&lookup, "SIESTA_CLIENT_MAX_HEADER_BYTES", &mut client.max_header_bytes);
        override_from(&lookup, "SIESTA_CLIENT_MAX_BODY_BYTES", &mut client.max_body_bytes);
    }
}

fn override_from<F, T>(lookup: &F, name: &str, field: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => warn!(variable = name, value = %raw, "Ignoring unparseable config override"),
    }
}

/// Load a YAML config file, then apply environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<SiestaConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let mut config = SiestaConfig::from_yaml_str(&content)
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SiestaConfig::default();
        assert_eq!(config.server.backlog, 64);
        assert_eq!(config.server.read_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.client.limits(), Limits::default());
    }

    #[test]
    fn test_partial_yaml() {
        let config = SiestaConfig::from_yaml_str("client:\n  read_timeout_ms: 0\n").unwrap();
        assert_eq!(config.client.read_timeout(), None);
        assert_eq!(config.client.connect_timeout_ms, 5_000);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_empty_yaml() {
        assert_eq!(SiestaConfig::from_yaml_str("  \n").unwrap(), SiestaConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SIESTA_BACKLOG", "256"),
            ("SIESTA_CLIENT_CONNECT_TIMEOUT_MS", " 750 "),
            ("SIESTA_SERVER_READ_TIMEOUT_MS", "soon"),
        ]
        .into_iter()
        .collect();

        let mut config = SiestaConfig::default();
        config.apply_env_from(|name| vars.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.server.backlog, 256);
        assert_eq!(config.client.connect_timeout(), Some(Duration::from_millis(750)));
        // Unparseable values leave the field alone.
        assert_eq!(config.server.read_timeout_ms, 30_000);
    }
}
