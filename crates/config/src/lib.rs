#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration for the depot mirror engine
//!
//! TOML file with per-section defaults; a missing file yields the default
//! configuration.

use depot_errors::{ConfigError, Error};
use depot_net::FetchConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub sync: SyncSection,
}

/// Paths and serving address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Upstream fetch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Refuse buffered payloads larger than this many bytes; absent means
    /// unlimited
    #[serde(default)]
    pub max_payload_bytes: Option<u64>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_payload_bytes: None,
        }
    }
}

impl FetchSection {
    /// Translate into the fetcher's runtime configuration
    #[must_use]
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_payload_bytes: self.max_payload_bytes,
            ..FetchConfig::default()
        }
    }
}

/// Sync worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults if it is absent
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_or_default(path: &Path) -> Result<Self, Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::ParseFailed {
                    message: e.to_string(),
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::ReadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/depot")
}

fn default_bind_addr() -> SocketAddr {
    ([127, 0, 0, 1], 8080).into()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/depot.toml"))
            .await
            .unwrap();
        assert_eq!(config.sync.concurrency, 4);
        assert_eq!(config.fetch.max_retries, 3);
    }

    #[tokio::test]
    async fn partial_file_fills_defaults() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        writeln!(temp, "[sync]\nconcurrency = 16").unwrap();

        let config = Config::load_or_default(temp.path()).await.unwrap();
        assert_eq!(config.sync.concurrency, 16);
        assert_eq!(config.fetch.timeout_secs, 300);
        assert_eq!(config.general.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        writeln!(temp, "not toml at all [[").unwrap();

        assert!(Config::load_or_default(temp.path()).await.is_err());
    }

    #[test]
    fn fetch_section_translates() {
        let section = FetchSection {
            timeout_secs: 10,
            max_retries: 1,
            ..FetchSection::default()
        };
        let fetch = section.to_fetch_config();
        assert_eq!(fetch.timeout, Duration::from_secs(10));
        assert_eq!(fetch.max_retries, 1);
    }
}
