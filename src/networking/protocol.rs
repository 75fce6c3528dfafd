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

//! Protocol handler seam and the decoder registry.

use async_trait::async_trait;
use libp2p::PeerId;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

use crate::{
    core::types::CodecError,
    networking::{
        host::HostError,
        message::{Message, MessageType, ProtocolId},
    },
};

/// Payload could not be turned into a message. The frame is dropped, the stream lives on.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed bytes.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Well-formed message of a type this protocol does not carry.
    #[error("{ty:?} is not carried on {protocol}")]
    UnexpectedType {
        /// Protocol the frame arrived on.
        protocol: ProtocolId,
        /// Decoded type.
        ty: MessageType,
    },
    /// No decoder registered.
    #[error("unknown protocol {0}")]
    UnknownProtocol(ProtocolId),
}

/// Handler failure. Fatal to the stream that delivered the message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Reply could not be sent.
    #[error("send: {0}")]
    Send(#[from] HostError),
    /// Reply could not be encoded.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// A handshake record that must exist at this point is gone.
    #[error("no handshake record for {peer} on {protocol}")]
    MissingHandshakeRecord {
        /// Peer.
        peer: PeerId,
        /// Protocol.
        protocol: ProtocolId,
    },
}

/// Decoding and business logic of one sub-protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Protocol served.
    fn protocol(&self) -> ProtocolId;

    /// Turn a frame payload from `peer` into a message.
    fn decode(&self, peer: &PeerId, payload: &[u8]) -> Result<Message, DecodeError>;

    /// Act on a decoded message.
    async fn handle(&self, peer: PeerId, msg: Message) -> Result<(), HandlerError>;

    /// Drop per-peer state.
    fn on_peer_disconnected(&self, _peer: &PeerId) {}

    /// Drop all state.
    fn reset(&self) {}
}

/// Registration errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Protocol ids must be unique.
    #[error("protocol {0} registered twice")]
    DuplicateProtocol(ProtocolId),
}

/// Maps each protocol id to exactly one handler.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    handlers: BTreeMap<ProtocolId, Arc<dyn ProtocolHandler>>,
}

impl ProtocolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler under its protocol id.
    pub fn register(&mut self, handler: Arc<dyn ProtocolHandler>) -> Result<(), RegistryError> {
        let protocol = handler.protocol();
        if self.handlers.contains_key(&protocol) {
            return Err(RegistryError::DuplicateProtocol(protocol));
        }
        self.handlers.insert(protocol, handler);
        Ok(())
    }

    /// Handler for `protocol`.
    pub fn get(&self, protocol: ProtocolId) -> Option<Arc<dyn ProtocolHandler>> {
        self.handlers.get(&protocol).cloned()
    }

    /// Decode a payload received from `peer` on `protocol`.
    pub fn decode(
        &self,
        protocol: ProtocolId,
        peer: &PeerId,
        payload: &[u8],
    ) -> Result<Message, DecodeError> {
        self.handlers
            .get(&protocol)
            .ok_or(DecodeError::UnknownProtocol(protocol))?
            .decode(peer, payload)
    }

    /// Registered handlers, ordered by protocol id.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ProtocolHandler>> {
        self.handlers.values()
    }

    /// Registered protocol ids.
    pub fn protocols(&self) -> Vec<ProtocolId> {
        self.handlers.keys().copied().collect()
    }
}
