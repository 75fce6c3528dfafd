// Copyright (c) 2026 Blocknet
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Node subsystems the network service hands work to.

use libp2p::PeerId;
use thiserror::Error;

use crate::core::types::{BlockNumber, H256};
use crate::networking::message::{BlockAnnounce, BlockRequest, BlockResponse, Message};

/// Why a block request cannot be served.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Requested blocks are not available locally.
    #[error("blocks not available")]
    Unavailable,
    /// Request is malformed or out of policy.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Block synchronisation decisions. Retry policy lives here, never in the network layer.
pub trait Syncer: Send + Sync {
    /// A peer announced a block. May ask for it.
    fn handle_block_announce(&self, from: &PeerId, msg: &BlockAnnounce) -> Option<BlockRequest>;

    /// A tracked request was answered. May ask for more.
    fn handle_block_response(&self, from: &PeerId, msg: BlockResponse) -> Option<BlockRequest>;

    /// Serve a peer's request.
    fn create_block_response(&self, req: &BlockRequest) -> Result<BlockResponse, SyncError>;

    /// A peer reported its best block.
    fn handle_seen_blocks(&self, number: BlockNumber) -> Option<BlockRequest>;

    /// False while catching up with the network.
    fn is_synced(&self) -> bool {
        true
    }
}

/// Read access to the local chain, used to build handshakes and status.
pub trait BlockState: Send + Sync {
    /// Local genesis hash.
    fn genesis_hash(&self) -> H256;

    /// Local best block.
    fn best_block(&self) -> (BlockNumber, H256);
}

/// Core message handler for gossiped payloads.
pub trait MessageHandler: Send + Sync {
    /// Called once per previously unseen gossip message.
    fn handle_message(&self, from: &PeerId, msg: &Message);
}
