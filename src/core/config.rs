// Copyright (c) 2026 Blocknet
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Network service configuration (TOML).
//!
//! ```text
//! [network]
//! data_dir = "/srv/blocknet/node1/data"
//! bootstrap = ["/ip4/10.0.0.2/tcp/30333/p2p/12D3KooW..."]
//! roles = 4
//! refresh_interval_ms = 10000
//! ```

use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

use crate::core::types::roles;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read config file.
    #[error("read config: {0}")]
    Read(#[from] std::io::Error),
    /// Cannot parse TOML.
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A multiaddr field does not parse.
    #[error("invalid multiaddr {0:?}")]
    BadMultiaddr(String),
    /// A numeric field is out of range.
    #[error("invalid value for {0}")]
    OutOfRange(&'static str),
}

/// Config file root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Network section.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Runtime configuration for the network service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Data directory holding the persistent p2p identity.
    pub data_dir: String,
    /// Bootstrap multiaddrs, handed to the host and dialled at startup.
    pub bootstrap: Vec<String>,
    /// If true, `host.bootstrap()` is skipped and the node is not expected to have peers.
    pub no_bootstrap: bool,
    /// Roles bitfield advertised to peers.
    pub roles: u8,
    /// Period of the network-state refresh loop.
    pub refresh_interval_ms: u64,
    /// Max declared frame length accepted by the frame reader.
    pub max_frame_len: usize,
    /// Max encoded message size accepted by decoders.
    pub max_message_len: usize,
    /// Capacity of the stream-error channel.
    pub error_channel_capacity: usize,
    /// Legacy status protocol version.
    pub protocol_version: u32,
    /// Lowest legacy protocol version still accepted.
    pub min_supported_version: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            bootstrap: Vec::new(),
            no_bootstrap: false,
            roles: roles::AUTHORITY,
            refresh_interval_ms: 10_000,
            max_frame_len: 16 * 1024 * 1024,
            max_message_len: 16 * 1024 * 1024,
            error_channel_capacity: 1024,
            protocol_version: 7,
            min_supported_version: 0,
        }
    }
}

impl NetworkConfig {
    /// Parse the `[network]` section of a TOML document and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw)?;
        file.network.validate()?;
        Ok(file.network)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check ranges and multiaddr syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("refresh_interval_ms"));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::OutOfRange("max_frame_len"));
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::OutOfRange("max_message_len"));
        }
        if self.error_channel_capacity == 0 {
            return Err(ConfigError::OutOfRange("error_channel_capacity"));
        }
        self.bootstrap_multiaddrs()?;
        Ok(())
    }

    /// Refresh loop period.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Parsed bootstrap addresses.
    pub fn bootstrap_multiaddrs(&self) -> Result<Vec<Multiaddr>, ConfigError> {
        self.bootstrap
            .iter()
            .map(|s| s.parse().map_err(|_| ConfigError::BadMultiaddr(s.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = NetworkConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.roles, roles::AUTHORITY);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_section_overrides_fields() {
        let cfg = NetworkConfig::from_toml_str(
            "[network]\nroles = 1\nno_bootstrap = true\nrefresh_interval_ms = 250\n",
        )
        .unwrap();
        assert_eq!(cfg.roles, 1);
        assert!(cfg.no_bootstrap);
        assert_eq!(cfg.refresh_interval_ms, 250);
        assert_eq!(cfg.max_frame_len, NetworkConfig::default().max_frame_len);
    }

    #[test]
    fn rejects_zero_interval_and_bad_bootstrap() {
        assert!(matches!(
            NetworkConfig::from_toml_str("[network]\nrefresh_interval_ms = 0\n"),
            Err(ConfigError::OutOfRange("refresh_interval_ms"))
        ));
        assert!(matches!(
            NetworkConfig::from_toml_str("[network]\nbootstrap = [\"not an addr\"]\n"),
            Err(ConfigError::BadMultiaddr(_))
        ));
    }
}
