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

//! Persistent node identity.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use libp2p::{identity, PeerId};
use thiserror::Error;
use tracing::info;

/// Key file name inside the data directory.
pub const IDENTITY_FILE: &str = "p2p_identity.key";

/// Identity errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Filesystem failure.
    #[error("identity io: {0}")]
    Io(#[from] io::Error),
    /// Key file exists but is not a protobuf-encoded keypair.
    #[error("identity file {path} is not a valid keypair")]
    Decode {
        /// Offending file.
        path: PathBuf,
    },
    /// Keypair could not be encoded.
    #[error("identity encode failed")]
    Encode,
}

/// Path of the key file for `data_dir`.
pub fn identity_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(IDENTITY_FILE)
}

/// Load the Ed25519 keypair from `data_dir`, or generate and persist one.
///
/// The file is written to a temporary name and renamed into place, owner-only on unix.
pub fn load_or_create_identity(
    data_dir: impl AsRef<Path>,
) -> Result<(PeerId, identity::Keypair), IdentityError> {
    let dir = data_dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = identity_path(dir);

    if path.exists() {
        let bytes = fs::read(&path)?;
        let kp = identity::Keypair::from_protobuf_encoding(&bytes)
            .map_err(|_| IdentityError::Decode { path: path.clone() })?;
        return Ok((PeerId::from(kp.public()), kp));
    }

    let kp = identity::Keypair::generate_ed25519();
    let bytes = kp.to_protobuf_encoding().map_err(|_| IdentityError::Encode)?;

    let tmp = dir.join(format!("{IDENTITY_FILE}.tmp"));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp, &path)?;

    let peer_id = PeerId::from(kp.public());
    info!(%peer_id, path = %path.display(), "generated new node identity");
    Ok((peer_id, kp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = load_or_create_identity(dir.path()).unwrap();
        let (b, _) = load_or_create_identity(dir.path()).unwrap();
        assert_eq!(a, b);
        assert!(identity_path(dir.path()).exists());
    }

    #[test]
    fn garbage_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(identity_path(dir.path()), b"not a key").unwrap();
        assert!(matches!(
            load_or_create_identity(dir.path()),
            Err(IdentityError::Decode { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        load_or_create_identity(dir.path()).unwrap();
        let mode = fs::metadata(identity_path(dir.path())).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
