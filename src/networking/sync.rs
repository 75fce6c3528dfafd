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

//! `/sync/2`: block requests and responses.
//!
//! Responses are only handed to the syncer when their id is consumed from the
//! request tracker; anything else (duplicates, late retries, unsolicited
//! responses) is dropped without error. Requests we cannot serve are dropped:
//! the protocol has no error response.

use async_trait::async_trait;
use libp2p::PeerId;
use std::sync::Arc;
use tracing::debug;

use crate::networking::{
    context::NetworkContext,
    message::{BlockRequest, BlockResponse, Message, MessageType, ProtocolId, SYNC_PROTOCOL},
    protocol::{DecodeError, HandlerError, ProtocolHandler},
};

/// Handler for [`SYNC_PROTOCOL`].
pub struct SyncHandler {
    ctx: Arc<NetworkContext>,
}

impl SyncHandler {
    /// New handler.
    pub fn new(ctx: Arc<NetworkContext>) -> Self {
        Self { ctx }
    }

    async fn on_request(&self, peer: PeerId, req: BlockRequest) -> Result<(), HandlerError> {
        match self.ctx.syncer.create_block_response(&req) {
            Ok(resp) => self.ctx.send_message(peer, &Message::BlockResponse(resp)).await,
            Err(error) => {
                debug!(%peer, id = req.id, %error, "cannot serve block request; dropping");
                Ok(())
            }
        }
    }

    async fn on_response(&self, peer: PeerId, resp: BlockResponse) -> Result<(), HandlerError> {
        // Consuming the id is the membership check: a second response for it finds nothing.
        if !self.ctx.tracker.remove(resp.id) {
            self.ctx.metrics.unsolicited_responses_total.inc();
            debug!(%peer, id = resp.id, "dropping block response for untracked id");
            return Ok(());
        }
        debug!(%peer, id = resp.id, blocks = resp.blocks.len(), "block response");
        if let Some(next) = self.ctx.syncer.handle_block_response(&peer, resp) {
            self.ctx.request_blocks(peer, next).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolHandler for SyncHandler {
    fn protocol(&self) -> ProtocolId {
        SYNC_PROTOCOL
    }

    fn decode(&self, _peer: &PeerId, payload: &[u8]) -> Result<Message, DecodeError> {
        let msg = Message::decode_tagged(payload, self.ctx.config.max_message_len)?;
        match msg.message_type() {
            MessageType::BlockRequest | MessageType::BlockResponse => Ok(msg),
            ty => Err(DecodeError::UnexpectedType {
                protocol: SYNC_PROTOCOL,
                ty,
            }),
        }
    }

    async fn handle(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError> {
        match msg {
            Message::BlockRequest(req) => self.on_request(peer, req).await,
            Message::BlockResponse(resp) => self.on_response(peer, resp).await,
            other => {
                debug!(%peer, ty = ?other.message_type(), "unexpected message on sync protocol");
                Ok(())
            }
        }
    }

    fn on_peer_disconnected(&self, peer: &PeerId) {
        let dropped = self.ctx.tracker.remove_peer(peer);
        if dropped > 0 {
            debug!(%peer, dropped, "forgot block requests to disconnected peer");
        }
    }

    fn reset(&self) {
        self.ctx.tracker.clear();
    }
}
