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

//! State shared between the orchestrator and every protocol handler.

use libp2p::PeerId;
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    core::{
        config::NetworkConfig,
        types::{BlockNumber, H256},
    },
    monitoring::metrics::NetworkMetrics,
    networking::{
        collaborators::{BlockState, Syncer},
        host::Host,
        message::{BlockRequest, Message},
        protocol::HandlerError,
        request_tracker::RequestTracker,
    },
};

/// What we know about a connected peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Peer identity (base58).
    #[serde(serialize_with = "ser_peer_id")]
    pub peer_id: PeerId,
    /// Advertised roles, 0 until a handshake or status arrives.
    pub roles: u8,
    /// Last known best block number.
    pub best_block_number: BlockNumber,
    /// Last known best block hash.
    pub best_block_hash: H256,
}

fn ser_peer_id<S: serde::Serializer>(p: &PeerId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&p.to_base58())
}

impl PeerInfo {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            roles: 0,
            best_block_number: 0,
            best_block_hash: H256::default(),
        }
    }
}

/// Connected peers.
#[derive(Default)]
pub struct PeerBook {
    peers: RwLock<BTreeMap<PeerId, PeerInfo>>,
}

impl PeerBook {
    /// Add a peer if unknown. Returns true if it was new.
    pub fn insert(&self, peer: PeerId) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(&peer) {
            return false;
        }
        peers.insert(peer, PeerInfo::new(peer));
        true
    }

    /// Forget a peer.
    pub fn remove(&self, peer: &PeerId) -> bool {
        self.peers.write().remove(peer).is_some()
    }

    /// Record a peer's roles and best block. Unknown peers are added.
    pub fn update_best(&self, peer: PeerId, roles: Option<u8>, number: BlockNumber, hash: H256) {
        let mut peers = self.peers.write();
        let info = peers.entry(peer).or_insert_with(|| PeerInfo::new(peer));
        if let Some(r) = roles {
            info.roles = r;
        }
        if number >= info.best_block_number {
            info.best_block_number = number;
            info.best_block_hash = hash;
        }
    }

    /// Snapshot of one peer.
    pub fn get(&self, peer: &PeerId) -> Option<PeerInfo> {
        self.peers.read().get(peer).cloned()
    }

    /// Snapshot, ordered by peer id.
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        self.peers.read().values().cloned().collect()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// True if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Forget everyone.
    pub fn clear(&self) {
        self.peers.write().clear();
    }
}

/// Handles and state reachable from every handler.
pub struct NetworkContext {
    /// Transport.
    pub host: Arc<dyn Host>,
    /// Local chain view.
    pub block_state: Arc<dyn BlockState>,
    /// Sync decisions.
    pub syncer: Arc<dyn Syncer>,
    /// Metrics.
    pub metrics: NetworkMetrics,
    /// In-flight block requests.
    pub tracker: RequestTracker,
    /// Connected peers.
    pub peers: PeerBook,
    /// Configuration.
    pub config: NetworkConfig,
}

impl NetworkContext {
    /// Encode `msg` for its protocol and send it to `peer`.
    pub async fn send_message(&self, peer: PeerId, msg: &Message) -> Result<(), HandlerError> {
        let payload = msg.encode_for_wire()?;
        self.host.send(peer, msg.protocol(), payload).await?;
        self.metrics.messages_sent_total.inc();
        Ok(())
    }

    /// Track and send a block request. Ids already in flight are not sent again.
    pub async fn request_blocks(&self, peer: PeerId, req: BlockRequest) -> Result<(), HandlerError> {
        let id = req.id;
        if !self.tracker.track(id, peer, Some(req.start)) {
            debug!(%peer, id, "block request already in flight");
            return Ok(());
        }
        if let Err(e) = self.send_message(peer, &Message::BlockRequest(req)).await {
            self.tracker.remove(id);
            return Err(e);
        }
        Ok(())
    }
}
