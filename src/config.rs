//! Server configuration, loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use cidr::IpCidr;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid accept_from entry {entry:?}: {reason}")]
    BadCidr { entry: String, reason: String },
}

/// The full server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub incoming: Incoming,
    pub outgoing: Outgoing,
    pub data: DataPaths,
}

/// The receive side: where to listen and what to accept.
#[derive(Debug, Clone, Deserialize)]
pub struct Incoming {
    /// Domain that every `RCPT TO` address must carry.
    pub domain: String,
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// CIDR blocks allowed to connect. Absent means accept every peer.
    pub accept_from: Option<Vec<String>>,
    /// Upper bound on buffered message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// The relay side: where expanded messages go out.
#[derive(Debug, Clone, Deserialize)]
pub struct Outgoing {
    pub server: String,
    pub port: u16,
    /// Envelope sender of every relayed message, so bounces come back here.
    pub envelope_sender: String,
    /// Optional address that receives one copy per accepted expression.
    pub archive_addr: Option<String>,
}

/// Where list definitions live on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub lists_dir: PathBuf,
    pub symbols_file: PathBuf,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_max_message_size() -> usize {
    10 * 1024 * 1024
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }
}

impl Incoming {
    /// Parses `accept_from` into CIDRs. `None` means accept every peer.
    pub fn accept_from_cidrs(&self) -> Result<Option<Vec<IpCidr>>, ConfigError> {
        let Some(entries) = &self.accept_from else {
            return Ok(None);
        };
        entries
            .iter()
            .map(|entry| {
                entry.parse::<IpCidr>().map_err(|err| ConfigError::BadCidr {
                    entry: entry.clone(),
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
