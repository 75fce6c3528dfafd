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

//! `/legacy/1`: type-tagged status exchange and transaction gossip.

use async_trait::async_trait;
use futures::future::join_all;
use libp2p::PeerId;
use parking_lot::Mutex;
use ring::digest;
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::{
    core::types::{CodecError, H256},
    networking::{
        collaborators::MessageHandler,
        context::NetworkContext,
        message::{Message, MessageType, ProtocolId, Status, LEGACY_PROTOCOL},
        protocol::{DecodeError, HandlerError, ProtocolHandler},
    },
};

/// Gossip hashes remembered for de-duplication.
const SEEN_CAPACITY: usize = 8192;

/// Bounded FIFO set of message hashes.
struct SeenCache {
    set: HashSet<H256>,
    order: VecDeque<H256>,
    cap: usize,
}

impl SeenCache {
    fn new(cap: usize) -> Self {
        Self {
            set: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// True if `h` was not seen before.
    fn insert(&mut self, h: H256) -> bool {
        if !self.set.insert(h) {
            return false;
        }
        self.order.push_back(h);
        if self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.set.clear();
        self.order.clear();
    }
}

fn gossip_hash(msg: &Message) -> Result<H256, CodecError> {
    let bytes = msg.encode_tagged()?;
    let d = digest::digest(&digest::SHA256, &bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    Ok(H256::from_bytes(out))
}

/// Handler for [`LEGACY_PROTOCOL`].
pub struct LegacyHandler {
    ctx: Arc<NetworkContext>,
    message_handler: Option<Arc<dyn MessageHandler>>,
    seen: Mutex<SeenCache>,
}

impl LegacyHandler {
    /// New handler; gossip is forwarded to `message_handler` when set.
    pub fn new(ctx: Arc<NetworkContext>, message_handler: Option<Arc<dyn MessageHandler>>) -> Self {
        Self {
            ctx,
            message_handler,
            seen: Mutex::new(SeenCache::new(SEEN_CAPACITY)),
        }
    }

    /// Our status, built from the current chain head.
    pub fn local_status(&self) -> Status {
        let (best_block_number, best_block_hash) = self.ctx.block_state.best_block();
        Status {
            protocol_version: self.ctx.config.protocol_version,
            min_supported_version: self.ctx.config.min_supported_version,
            roles: self.ctx.config.roles,
            best_block_number,
            best_block_hash,
            genesis_hash: self.ctx.block_state.genesis_hash(),
            chain_status: Vec::new(),
        }
    }

    /// Send our status to `peer`.
    pub async fn send_status(&self, peer: PeerId) -> Result<(), HandlerError> {
        let status = Message::Status(self.local_status());
        self.ctx.send_message(peer, &status).await
    }

    /// Gossip a locally originated message to every peer except `except`.
    pub async fn gossip(&self, msg: &Message, except: Option<PeerId>) -> Result<(), HandlerError> {
        // Our own messages must not bounce back to us as new.
        self.seen.lock().insert(gossip_hash(msg)?);
        self.forward(msg, except).await;
        Ok(())
    }

    async fn forward(&self, msg: &Message, except: Option<PeerId>) {
        let sends = self
            .ctx
            .host
            .peers()
            .into_iter()
            .filter(|p| Some(*p) != except)
            .map(|peer| async move { (peer, self.ctx.send_message(peer, msg).await) });
        for (peer, res) in join_all(sends).await {
            if let Err(error) = res {
                warn!(%peer, %error, "gossip send failed");
            }
        }
    }

    async fn on_status(&self, peer: PeerId, status: Status) -> Result<(), HandlerError> {
        let genesis = self.ctx.block_state.genesis_hash();
        if status.genesis_hash != genesis {
            debug!(%peer, theirs = %status.genesis_hash, "status for another chain; ignoring");
            return Ok(());
        }
        if status.protocol_version < self.ctx.config.min_supported_version {
            debug!(%peer, version = status.protocol_version, "status below minimum version; ignoring");
            return Ok(());
        }
        self.ctx.peers.update_best(
            peer,
            Some(status.roles),
            status.best_block_number,
            status.best_block_hash,
        );
        if let Some(req) = self.ctx.syncer.handle_seen_blocks(status.best_block_number) {
            self.ctx.request_blocks(peer, req).await?;
        }
        Ok(())
    }

    async fn on_gossip(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError> {
        let hash = gossip_hash(&msg)?;
        if !self.seen.lock().insert(hash) {
            self.ctx.metrics.gossip_duplicates_total.inc();
            return Ok(());
        }
        if let Some(h) = &self.message_handler {
            h.handle_message(&peer, &msg);
        }
        self.forward(&msg, Some(peer)).await;
        Ok(())
    }
}

#[async_trait]
impl ProtocolHandler for LegacyHandler {
    fn protocol(&self) -> ProtocolId {
        LEGACY_PROTOCOL
    }

    fn decode(&self, _peer: &PeerId, payload: &[u8]) -> Result<Message, DecodeError> {
        let msg = Message::decode_tagged(payload, self.ctx.config.max_message_len)?;
        match msg.message_type() {
            MessageType::Status | MessageType::Transactions => Ok(msg),
            ty => Err(DecodeError::UnexpectedType {
                protocol: LEGACY_PROTOCOL,
                ty,
            }),
        }
    }

    async fn handle(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError> {
        match msg {
            Message::Status(s) => self.on_status(peer, s).await,
            m @ Message::Transactions(_) => self.on_gossip(peer, m).await,
            other => {
                debug!(%peer, ty = ?other.message_type(), "unexpected message on legacy protocol");
                Ok(())
            }
        }
    }

    fn reset(&self) {
        self.seen.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_cache_evicts_oldest() {
        let mut c = SeenCache::new(2);
        let h = |n: u8| H256::from_bytes([n; 32]);
        assert!(c.insert(h(1)));
        assert!(!c.insert(h(1)));
        assert!(c.insert(h(2)));
        assert!(c.insert(h(3)));
        // h(1) fell out.
        assert!(c.insert(h(1)));
        assert!(!c.insert(h(3)));
    }
}
