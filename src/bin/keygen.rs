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

//! Create (or show) the node identity for a data directory.
//!
//! Usage: `blocknet-keygen [DATA_DIR | CONFIG.toml]`

use anyhow::{Context, Result};
use blocknet::{
    core::config::NetworkConfig,
    monitoring::logging::{init_tracing, LogFormat},
    networking::p2p_identity::{identity_path, load_or_create_identity},
};
use std::path::PathBuf;

fn main() -> Result<()> {
    let format = std::env::var("BLOCKNET_LOG_FORMAT")
        .map(|v| LogFormat::from_env_value(&v))
        .unwrap_or(LogFormat::Compact);
    init_tracing(format);

    let arg = std::env::args().nth(1);
    let data_dir = match arg {
        Some(a) if a.ends_with(".toml") => {
            let cfg = NetworkConfig::load(&a).with_context(|| format!("loading {a}"))?;
            PathBuf::from(cfg.data_dir)
        }
        Some(a) => PathBuf::from(a),
        None => PathBuf::from(NetworkConfig::default().data_dir),
    };

    let (peer_id, _kp) = load_or_create_identity(&data_dir)
        .with_context(|| format!("identity in {}", data_dir.display()))?;
    tracing::debug!(path = %identity_path(&data_dir).display(), "identity ready");
    println!("{peer_id}");
    Ok(())
}
