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
#![deny(missing_docs)]

//! `/block-announces/1`: handshake-gated block announcements.
//!
//! Per peer: `Unknown -> HandshakeReceived -> Validated`.
//!
//! - **Responder** (no record, or nothing received yet and we did not initiate):
//!   validate; on mismatch keep `{received, !validated}`; on success mark
//!   validated and reply with our handshake.
//! - **Initiator** (we sent our handshake first): validate the reply; on
//!   mismatch delete the record; on success mark validated.
//! - Once validated, a queued outbound announce is sent exactly once.
//! - Any later handshake is ignored.
//!
//! There is no type tag on the wire: until a handshake was received from a
//! peer its frames decode as a handshake, afterwards as an announce.

use async_trait::async_trait;
use libp2p::PeerId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    core::types::H256,
    networking::{
        context::NetworkContext,
        handshake::{HandshakeStore, OutboundRoute},
        message::{
            BlockAnnounce, BlockAnnounceHandshake, Message, MessageType, ProtocolId,
            BLOCK_ANNOUNCES_PROTOCOL,
        },
        protocol::{DecodeError, HandlerError, ProtocolHandler},
    },
};

/// Handshake validation failure. Fatal to the (peer, protocol) record only.
#[derive(Debug, Error)]
pub enum HandshakeRejected {
    /// Peer is on another chain.
    #[error("genesis mismatch: ours {ours}, theirs {theirs}")]
    GenesisMismatch {
        /// Local genesis.
        ours: H256,
        /// Remote genesis.
        theirs: H256,
    },
}

/// Handler for [`BLOCK_ANNOUNCES_PROTOCOL`].
pub struct BlockAnnounceHandler {
    ctx: Arc<NetworkContext>,
    handshakes: HandshakeStore,
}

impl BlockAnnounceHandler {
    /// New handler with an empty handshake store.
    pub fn new(ctx: Arc<NetworkContext>) -> Self {
        Self {
            ctx,
            handshakes: HandshakeStore::new(BLOCK_ANNOUNCES_PROTOCOL),
        }
    }

    /// Per-peer handshake records.
    pub fn handshakes(&self) -> &HandshakeStore {
        &self.handshakes
    }

    /// Our handshake, built from the current chain head.
    pub fn local_handshake(&self) -> BlockAnnounceHandshake {
        let (best_block_number, best_block_hash) = self.ctx.block_state.best_block();
        BlockAnnounceHandshake {
            roles: self.ctx.config.roles,
            best_block_number,
            best_block_hash,
            genesis_hash: self.ctx.block_state.genesis_hash(),
        }
    }

    /// Check a remote handshake against local chain.
    pub fn validate(&self, hs: &BlockAnnounceHandshake) -> Result<(), HandshakeRejected> {
        let ours = self.ctx.block_state.genesis_hash();
        if hs.genesis_hash != ours {
            return Err(HandshakeRejected::GenesisMismatch {
                ours,
                theirs: hs.genesis_hash,
            });
        }
        Ok(())
    }

    /// Send `msg` to `peer`, holding it back until the handshake completes.
    pub async fn send_to(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError> {
        match self.handshakes.route_outbound(peer, msg) {
            OutboundRoute::SendNow(m) => self.ctx.send_message(peer, &m).await,
            OutboundRoute::SendHandshake => {
                if let Err(e) = self.send_handshake(peer).await {
                    // Nothing reached the peer; the next attempt starts over.
                    self.handshakes.remove(&peer);
                    return Err(e);
                }
                Ok(())
            }
            OutboundRoute::Queued => Ok(()),
            OutboundRoute::Skip => {
                debug!(%peer, "peer failed block-announce handshake; not announcing");
                Ok(())
            }
        }
    }

    /// [`Self::send_to`] every connected peer. Failures are logged per peer.
    pub async fn broadcast(&self, msg: Message) {
        for peer in self.ctx.host.peers() {
            if let Err(error) = self.send_to(peer, msg.clone()).await {
                warn!(%peer, %error, "block announce send failed");
            }
        }
    }

    async fn send_handshake(&self, peer: PeerId) -> Result<(), HandlerError> {
        let hs = Message::BlockAnnounceHandshake(self.local_handshake());
        self.ctx.send_message(peer, &hs).await
    }

    async fn flush_pending(&self, peer: PeerId, pending: Option<Message>) -> Result<(), HandlerError> {
        if let Some(msg) = pending {
            debug!(%peer, "sending announce queued behind handshake");
            self.ctx.send_message(peer, &msg).await?;
        }
        Ok(())
    }

    async fn on_handshake(&self, peer: PeerId, hs: BlockAnnounceHandshake) -> Result<(), HandlerError> {
        let record = self.handshakes.get(&peer);
        match record {
            Some(r) if r.is_complete() => {
                debug!(%peer, "handshake already complete; ignoring");
                Ok(())
            }
            Some(r) if r.received() => {
                debug!(%peer, "handshake already rejected; ignoring");
                Ok(())
            }
            Some(r) if r.is_initiator() => {
                if let Err(reason) = self.validate(&hs) {
                    self.ctx.metrics.handshake_failures_total.inc();
                    warn!(%peer, %reason, "handshake reply rejected; dropping record");
                    self.handshakes.remove(&peer);
                    return Ok(());
                }
                self.note_peer(peer, &hs);
                let pending = self.handshakes.complete(&peer).ok_or(
                    HandlerError::MissingHandshakeRecord {
                        peer,
                        protocol: BLOCK_ANNOUNCES_PROTOCOL,
                    },
                )?;
                info!(%peer, best = hs.best_block_number, "block-announce handshake complete (initiator)");
                self.flush_pending(peer, pending).await
            }
            _ => {
                if let Err(reason) = self.validate(&hs) {
                    self.ctx.metrics.handshake_failures_total.inc();
                    warn!(%peer, %reason, "handshake rejected");
                    self.handshakes.mark_rejected(peer);
                    return Ok(());
                }
                self.note_peer(peer, &hs);
                let pending = self.handshakes.accept(peer);
                info!(%peer, best = hs.best_block_number, "block-announce handshake complete (responder)");
                if let Err(error) = self.send_handshake(peer).await {
                    warn!(%peer, %error, "failed to send handshake reply");
                }
                self.flush_pending(peer, pending).await
            }
        }
    }

    async fn on_announce(&self, peer: PeerId, announce: BlockAnnounce) -> Result<(), HandlerError> {
        if !self
            .handshakes
            .get(&peer)
            .is_some_and(|r| r.is_complete())
        {
            debug!(%peer, number = announce.number, "announce from unvalidated peer; dropping");
            return Ok(());
        }
        if announce.best_block {
            let hash = announce.header_hash()?;
            self.ctx.peers.update_best(peer, None, announce.number, hash);
        }
        if let Some(req) = self.ctx.syncer.handle_block_announce(&peer, &announce) {
            self.ctx.request_blocks(peer, req).await?;
        }
        Ok(())
    }

    fn note_peer(&self, peer: PeerId, hs: &BlockAnnounceHandshake) {
        self.ctx
            .peers
            .update_best(peer, Some(hs.roles), hs.best_block_number, hs.best_block_hash);
    }
}

#[async_trait]
impl ProtocolHandler for BlockAnnounceHandler {
    fn protocol(&self) -> ProtocolId {
        BLOCK_ANNOUNCES_PROTOCOL
    }

    fn decode(&self, peer: &PeerId, payload: &[u8]) -> Result<Message, DecodeError> {
        let ty = if self.handshakes.expects_handshake(peer) {
            MessageType::BlockAnnounceHandshake
        } else {
            MessageType::BlockAnnounce
        };
        Ok(Message::decode_untagged(ty, payload, self.ctx.config.max_message_len)?)
    }

    async fn handle(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError> {
        match msg {
            Message::BlockAnnounceHandshake(hs) => self.on_handshake(peer, hs).await,
            Message::BlockAnnounce(a) => self.on_announce(peer, a).await,
            other => {
                debug!(%peer, ty = ?other.message_type(), "unexpected message on block-announce protocol");
                Ok(())
            }
        }
    }

    fn on_peer_disconnected(&self, peer: &PeerId) {
        self.handshakes.remove(peer);
    }

    fn reset(&self) {
        self.handshakes.clear();
    }
}
