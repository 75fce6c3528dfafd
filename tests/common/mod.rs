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

#![allow(dead_code)]

//! Test doubles shared by the integration tests.

use async_trait::async_trait;
use blocknet::{
    core::{
        config::NetworkConfig,
        types::{BlockNumber, H256},
    },
    monitoring::metrics::NetworkMetrics,
    networking::{
        collaborators::{BlockState, MessageHandler, SyncError, Syncer},
        context::{NetworkContext, PeerBook},
        frame::write_frame,
        host::{ConnectionHandler, Host, HostError, StreamHandler},
        message::{
            BlockAnnounce, BlockAnnounceHandshake, BlockData, BlockRequest, BlockResponse,
            Direction, FromBlock, Message, ProtocolId,
        },
        request_tracker::RequestTracker,
    },
};
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::io::DuplexStream;

pub const GENESIS: H256 = H256::from_bytes([7u8; 32]);

/// One payload handed to [`RecordingHost::send`].
#[derive(Clone, Debug)]
pub struct Sent {
    pub peer: PeerId,
    pub protocol: ProtocolId,
    pub payload: Vec<u8>,
}

/// Host that records sends instead of performing them.
pub struct RecordingHost {
    id: PeerId,
    peers: Mutex<Vec<PeerId>>,
    sent: Mutex<Vec<Sent>>,
    bootstrap: Mutex<Vec<Multiaddr>>,
    fail_sends: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::random(),
            peers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            bootstrap: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    pub fn set_peers(&self, peers: Vec<PeerId>) {
        *self.peers.lock() = peers;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn bootstrap_addrs(&self) -> Vec<Multiaddr> {
        self.bootstrap.lock().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn sent_on(&self, protocol: ProtocolId) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.protocol == protocol).collect()
    }
}

#[async_trait]
impl Host for RecordingHost {
    fn local_peer_id(&self) -> PeerId {
        self.id
    }

    fn register_stream_handler(&self, _protocol: ProtocolId, _handler: StreamHandler) {}

    fn set_connection_handler(&self, _handler: ConnectionHandler) {}

    async fn send(
        &self,
        peer: PeerId,
        protocol: ProtocolId,
        payload: Vec<u8>,
    ) -> Result<(), HostError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(HostError::NotConnected(peer));
        }
        self.sent.lock().push(Sent {
            peer,
            protocol,
            payload,
        });
        Ok(())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().clone()
    }

    fn multiaddrs(&self) -> Vec<Multiaddr> {
        Vec::new()
    }

    fn set_bootstrap_addrs(&self, addrs: Vec<Multiaddr>) {
        *self.bootstrap.lock() = addrs;
    }

    async fn bootstrap(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Fixed chain view.
pub struct MockChain {
    pub genesis: H256,
    pub best: (BlockNumber, H256),
}

impl MockChain {
    pub fn new(best: BlockNumber) -> Arc<Self> {
        Arc::new(Self {
            genesis: GENESIS,
            best: (best, H256::from_bytes([best as u8; 32])),
        })
    }
}

impl BlockState for MockChain {
    fn genesis_hash(&self) -> H256 {
        self.genesis
    }

    fn best_block(&self) -> (BlockNumber, H256) {
        self.best
    }
}

/// Syncer that records every call.
#[derive(Default)]
pub struct MockSyncer {
    pub announces: Mutex<Vec<(PeerId, BlockAnnounce)>>,
    pub responses: Mutex<Vec<(PeerId, BlockResponse)>>,
    pub served: Mutex<Vec<BlockRequest>>,
    pub refused: Mutex<Vec<u64>>,
    pub seen: Mutex<Vec<BlockNumber>>,
    /// Returned from `handle_block_announce`, once.
    pub request_on_announce: Mutex<Option<BlockRequest>>,
    /// Returned from `handle_block_response`, once.
    pub request_on_response: Mutex<Option<BlockRequest>>,
    /// Returned from `handle_seen_blocks`, once.
    pub request_on_seen: Mutex<Option<BlockRequest>>,
    pub refuse_requests: AtomicBool,
}

impl MockSyncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn announce_count(&self) -> usize {
        self.announces.lock().len()
    }

    pub fn response_count(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Syncer for MockSyncer {
    fn handle_block_announce(&self, from: &PeerId, msg: &BlockAnnounce) -> Option<BlockRequest> {
        self.announces.lock().push((*from, msg.clone()));
        self.request_on_announce.lock().take()
    }

    fn handle_block_response(&self, from: &PeerId, msg: BlockResponse) -> Option<BlockRequest> {
        self.responses.lock().push((*from, msg));
        self.request_on_response.lock().take()
    }

    fn create_block_response(&self, req: &BlockRequest) -> Result<BlockResponse, SyncError> {
        if self.refuse_requests.load(Ordering::SeqCst) {
            self.refused.lock().push(req.id);
            return Err(SyncError::Unavailable);
        }
        self.served.lock().push(req.clone());
        Ok(BlockResponse {
            id: req.id,
            blocks: vec![BlockData {
                hash: H256::from_bytes([1; 32]),
                header: Some(vec![1, 2, 3]),
                body: None,
                justification: None,
            }],
        })
    }

    fn handle_seen_blocks(&self, number: BlockNumber) -> Option<BlockRequest> {
        self.seen.lock().push(number);
        self.request_on_seen.lock().take()
    }
}

/// Message handler that records gossip deliveries.
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<(PeerId, Message)>>,
}

impl RecordingHandler {
    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle_message(&self, from: &PeerId, msg: &Message) {
        self.received.lock().push((*from, msg.clone()));
    }
}

pub fn context(
    host: Arc<RecordingHost>,
    chain: Arc<MockChain>,
    syncer: Arc<MockSyncer>,
) -> Arc<NetworkContext> {
    Arc::new(NetworkContext {
        host,
        block_state: chain,
        syncer,
        metrics: NetworkMetrics::new().unwrap(),
        tracker: RequestTracker::new(),
        peers: PeerBook::default(),
        config: NetworkConfig::default(),
    })
}

pub fn handshake(genesis: H256, best: BlockNumber) -> BlockAnnounceHandshake {
    BlockAnnounceHandshake {
        roles: 4,
        best_block_number: best,
        best_block_hash: H256::from_bytes([0xbb; 32]),
        genesis_hash: genesis,
    }
}

pub fn announce(number: BlockNumber) -> BlockAnnounce {
    BlockAnnounce {
        parent_hash: H256::from_bytes([number.wrapping_sub(1) as u8; 32]),
        number,
        state_root: H256::from_bytes([0x5a; 32]),
        extrinsics_root: H256::from_bytes([0xa5; 32]),
        digest: vec![b"seal".to_vec()],
        best_block: true,
    }
}

pub fn block_request(id: u64) -> BlockRequest {
    BlockRequest {
        id,
        requested_data: 1,
        start: FromBlock::Number(1),
        end: None,
        direction: Direction::Ascending,
        max: Some(16),
    }
}

/// A finished stream carrying `payloads`, one frame each.
pub async fn stream_of(payloads: &[Vec<u8>]) -> DuplexStream {
    let (mut tx, rx) = tokio::io::duplex(1 << 20);
    for p in payloads {
        write_frame(&mut tx, p).await.unwrap();
    }
    drop(tx);
    rx
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
