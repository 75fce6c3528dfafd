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

//! Wire messages and sub-protocol identifiers.
//!
//! Two encodings exist:
//! - **untagged**: the canonical bytes of the variant's payload struct only. Used on
//!   handshake-gated protocols, where the receiver infers the type from per-peer state.
//! - **tagged**: one [`MessageType`] byte followed by the untagged bytes. Used on
//!   every other protocol.

use ring::digest;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{
    decode_canonical_limited, encode_canonical, BlockNumber, CodecError, H256,
};

/// Name of an application protocol multiplexed over the shared transport.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(&'static str);

impl ProtocolId {
    /// Wrap a static protocol name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }
    /// Protocol name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Block announcements, handshake-gated.
pub const BLOCK_ANNOUNCES_PROTOCOL: ProtocolId = ProtocolId::new("/block-announces/1");
/// Block requests and responses.
pub const SYNC_PROTOCOL: ProtocolId = ProtocolId::new("/sync/2");
/// Status and transaction gossip, type-tagged.
pub const LEGACY_PROTOCOL: ProtocolId = ProtocolId::new("/legacy/1");

/// Protocol-agnostic message type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// [`Status`].
    Status = 0,
    /// [`BlockRequest`].
    BlockRequest = 1,
    /// [`BlockResponse`].
    BlockResponse = 2,
    /// [`BlockAnnounce`].
    BlockAnnounce = 3,
    /// [`Transactions`].
    Transactions = 4,
    /// [`BlockAnnounceHandshake`].
    BlockAnnounceHandshake = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => MessageType::Status,
            1 => MessageType::BlockRequest,
            2 => MessageType::BlockResponse,
            3 => MessageType::BlockAnnounce,
            4 => MessageType::Transactions,
            5 => MessageType::BlockAnnounceHandshake,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// Handshake exchanged on [`BLOCK_ANNOUNCES_PROTOCOL`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnounceHandshake {
    /// Sender roles bitfield.
    pub roles: u8,
    /// Sender best block number.
    pub best_block_number: BlockNumber,
    /// Sender best block hash.
    pub best_block_hash: H256,
    /// Sender genesis hash; must equal ours.
    pub genesis_hash: H256,
}

/// Announcement of a new block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnounce {
    /// Parent block hash.
    pub parent_hash: H256,
    /// Block number.
    pub number: BlockNumber,
    /// Post-state root.
    pub state_root: H256,
    /// Extrinsics root.
    pub extrinsics_root: H256,
    /// Opaque digest items.
    pub digest: Vec<Vec<u8>>,
    /// Whether the sender considers this its new best block.
    pub best_block: bool,
}

impl BlockAnnounce {
    /// SHA-256 of the canonical header encoding.
    pub fn header_hash(&self) -> Result<H256, CodecError> {
        let bytes = encode_canonical(self)?;
        let d = digest::digest(&digest::SHA256, &bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(d.as_ref());
        Ok(H256::from_bytes(out))
    }
}

/// Bit flags for [`BlockRequest::requested_data`].
pub mod requested_data {
    /// Block header.
    pub const HEADER: u8 = 1;
    /// Block body.
    pub const BODY: u8 = 2;
    /// Justification.
    pub const JUSTIFICATION: u8 = 16;
}

/// Starting point of a block request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FromBlock {
    /// Start at the block with this hash.
    Hash(H256),
    /// Start at this height.
    Number(BlockNumber),
}

/// Iteration direction of a block request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Towards higher numbers.
    Ascending,
    /// Towards genesis.
    Descending,
}

/// Request for a range of blocks, correlated to its response by `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    /// Correlation id.
    pub id: u64,
    /// [`requested_data`] flags.
    pub requested_data: u8,
    /// First block.
    pub start: FromBlock,
    /// Optional last block hash.
    pub end: Option<H256>,
    /// Direction.
    pub direction: Direction,
    /// Max number of blocks.
    pub max: Option<u32>,
}

/// One block in a [`BlockResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    /// Block hash.
    pub hash: H256,
    /// Encoded header, if requested.
    pub header: Option<Vec<u8>>,
    /// Encoded extrinsics, if requested.
    pub body: Option<Vec<Vec<u8>>>,
    /// Justification, if requested and available.
    pub justification: Option<Vec<u8>>,
}

/// Response to a [`BlockRequest`] with the same `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    /// Correlation id of the request.
    pub id: u64,
    /// Blocks, in request direction order.
    pub blocks: Vec<BlockData>,
}

/// Legacy chain status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Sender protocol version.
    pub protocol_version: u32,
    /// Lowest version the sender accepts.
    pub min_supported_version: u32,
    /// Sender roles bitfield.
    pub roles: u8,
    /// Sender best block number.
    pub best_block_number: BlockNumber,
    /// Sender best block hash.
    pub best_block_hash: H256,
    /// Sender genesis hash.
    pub genesis_hash: H256,
    /// Opaque chain-specific status.
    pub chain_status: Vec<u8>,
}

/// Gossiped transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transactions {
    /// Encoded extrinsics.
    pub extrinsics: Vec<Vec<u8>>,
}

/// Any message the service sends or receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Block-announce handshake.
    BlockAnnounceHandshake(BlockAnnounceHandshake),
    /// Block announcement.
    BlockAnnounce(BlockAnnounce),
    /// Block request.
    BlockRequest(BlockRequest),
    /// Block response.
    BlockResponse(BlockResponse),
    /// Legacy status.
    Status(Status),
    /// Transaction gossip.
    Transactions(Transactions),
}

impl Message {
    /// Type tag of this variant.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::BlockAnnounceHandshake(_) => MessageType::BlockAnnounceHandshake,
            Message::BlockAnnounce(_) => MessageType::BlockAnnounce,
            Message::BlockRequest(_) => MessageType::BlockRequest,
            Message::BlockResponse(_) => MessageType::BlockResponse,
            Message::Status(_) => MessageType::Status,
            Message::Transactions(_) => MessageType::Transactions,
        }
    }

    /// Protocol this message travels on.
    pub fn protocol(&self) -> ProtocolId {
        match self {
            Message::BlockAnnounceHandshake(_) | Message::BlockAnnounce(_) => {
                BLOCK_ANNOUNCES_PROTOCOL
            }
            Message::BlockRequest(_) | Message::BlockResponse(_) => SYNC_PROTOCOL,
            Message::Status(_) | Message::Transactions(_) => LEGACY_PROTOCOL,
        }
    }

    /// Payload bytes without a type tag.
    pub fn encode_untagged(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Message::BlockAnnounceHandshake(m) => encode_canonical(m),
            Message::BlockAnnounce(m) => encode_canonical(m),
            Message::BlockRequest(m) => encode_canonical(m),
            Message::BlockResponse(m) => encode_canonical(m),
            Message::Status(m) => encode_canonical(m),
            Message::Transactions(m) => encode_canonical(m),
        }
    }

    /// Decode untagged bytes as the given type.
    pub fn decode_untagged(
        ty: MessageType,
        bytes: &[u8],
        max: usize,
    ) -> Result<Self, CodecError> {
        Ok(match ty {
            MessageType::BlockAnnounceHandshake => {
                Message::BlockAnnounceHandshake(decode_canonical_limited(bytes, max)?)
            }
            MessageType::BlockAnnounce => Message::BlockAnnounce(decode_canonical_limited(bytes, max)?),
            MessageType::BlockRequest => Message::BlockRequest(decode_canonical_limited(bytes, max)?),
            MessageType::BlockResponse => Message::BlockResponse(decode_canonical_limited(bytes, max)?),
            MessageType::Status => Message::Status(decode_canonical_limited(bytes, max)?),
            MessageType::Transactions => Message::Transactions(decode_canonical_limited(bytes, max)?),
        })
    }

    /// Type byte followed by the untagged payload.
    pub fn encode_tagged(&self) -> Result<Vec<u8>, CodecError> {
        let body = self.encode_untagged()?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.message_type() as u8);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a tagged payload.
    pub fn decode_tagged(bytes: &[u8], max: usize) -> Result<Self, CodecError> {
        let (&tag, rest) = bytes.split_first().ok_or(CodecError::Empty)?;
        Self::decode_untagged(MessageType::try_from(tag)?, rest, max)
    }

    /// Bytes for the wire of [`Self::protocol`].
    pub fn encode_for_wire(&self) -> Result<Vec<u8>, CodecError> {
        if self.protocol() == BLOCK_ANNOUNCES_PROTOCOL {
            self.encode_untagged()
        } else {
            self.encode_tagged()
        }
    }
}
