use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::Level;
use vssp_core::{AssemblyConfig, HEADER_LEN};

use crate::error::{RelayError, Result};

/// Returns the ~/.vssp directory, if a home directory can be determined.
pub fn vssp_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|mut path| {
        path.push(".vssp");
        path
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub viewers: ViewerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ingest: IngestConfig::default(),
            assembly: AssemblyConfig::default(),
            viewers: ViewerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// UDP address fragments arrive on
    pub bind: SocketAddr,
    /// Receive buffer per datagram; longer datagrams are truncated by the OS
    pub max_datagram: usize,
    /// Requested SO_RCVBUF in bytes; 0 keeps the OS default
    pub recv_buffer: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8766)),
            max_datagram: 2048,
            recv_buffer: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// WebSocket + status API address
    pub bind: SocketAddr,
    /// Envelopes buffered per viewer before the oldest is dropped
    pub queue_depth: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8787)),
            queue_depth: 4,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        vssp_data_dir().map(|dir| dir.join("relay.toml"))
    }

    /// Load from `path`, or from `~/.vssp/relay.toml` when present, or fall
    /// back to defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| RelayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.assembly.policy()?;
        self.level()?;
        if self.viewers.queue_depth == 0 {
            return Err(RelayError::InvalidConfig(
                "viewers.queue_depth must be at least 1".into(),
            ));
        }
        if self.ingest.max_datagram < HEADER_LEN {
            return Err(RelayError::InvalidConfig(format!(
                "ingest.max_datagram must hold a {}-byte header",
                HEADER_LEN
            )));
        }
        if self.assembly.max_buffers == 0 {
            return Err(RelayError::InvalidConfig(
                "assembly.max_buffers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| RelayError::InvalidConfig(format!("unknown log level {:?}", self.log_level)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RelayError::InvalidConfig(e.to_string()))
    }
}
