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

mod common;

use blocknet::{
    core::types::H256,
    networking::{
        block_announce::BlockAnnounceHandler,
        context::NetworkContext,
        dispatch::{Dispatcher, StreamEnd},
        message::{Message, MessageType, BLOCK_ANNOUNCES_PROTOCOL, SYNC_PROTOCOL},
        protocol::ProtocolHandler,
    },
};
use common::*;
use libp2p::PeerId;
use std::sync::Arc;
use tokio::sync::mpsc;

const MAX: usize = 1 << 20;

struct Fixture {
    ctx: Arc<NetworkContext>,
    host: Arc<RecordingHost>,
    syncer: Arc<MockSyncer>,
    handler: Arc<BlockAnnounceHandler>,
}

impl Fixture {
    fn new() -> Self {
        let host = RecordingHost::new();
        let syncer = MockSyncer::new();
        let ctx = context(host.clone(), MockChain::new(10), syncer.clone());
        let handler = Arc::new(BlockAnnounceHandler::new(ctx.clone()));
        Self {
            ctx,
            host,
            syncer,
            handler,
        }
    }

    fn handshakes_sent_to(&self, peer: PeerId) -> Vec<Message> {
        self.host
            .sent_on(BLOCK_ANNOUNCES_PROTOCOL)
            .into_iter()
            .filter(|s| s.peer == peer)
            .filter_map(|s| {
                Message::decode_untagged(MessageType::BlockAnnounceHandshake, &s.payload, MAX).ok()
            })
            .collect()
    }

    fn announces_sent_to(&self, peer: PeerId) -> Vec<Message> {
        self.host
            .sent_on(BLOCK_ANNOUNCES_PROTOCOL)
            .into_iter()
            .filter(|s| s.peer == peer)
            .filter_map(|s| Message::decode_untagged(MessageType::BlockAnnounce, &s.payload, MAX).ok())
            .collect()
    }
}

#[tokio::test]
async fn responder_validates_and_replies() {
    let f = Fixture::new();
    let peer = PeerId::random();

    let theirs = handshake(GENESIS, 77);
    assert!(f.handler.handshakes().expects_handshake(&peer));
    f.handler
        .handle(peer, Message::BlockAnnounceHandshake(theirs))
        .await
        .unwrap();

    let rec = f.handler.handshakes().get(&peer).unwrap();
    assert!(rec.received() && rec.is_validated() && !rec.is_initiator());
    assert!(rec.pending_outbound().is_none());

    let replies = f.handshakes_sent_to(peer);
    assert_eq!(
        replies,
        vec![Message::BlockAnnounceHandshake(f.handler.local_handshake())]
    );

    let info = f.ctx.peers.get(&peer).unwrap();
    assert_eq!(info.roles, 4);
    assert_eq!(info.best_block_number, 77);
}

#[tokio::test]
async fn repeated_handshake_is_ignored() {
    let f = Fixture::new();
    let peer = PeerId::random();
    let hs = Message::BlockAnnounceHandshake(handshake(GENESIS, 77));

    f.handler.handle(peer, hs.clone()).await.unwrap();
    let before = f.handler.handshakes().get(&peer);
    f.handler.handle(peer, hs).await.unwrap();

    assert_eq!(f.handler.handshakes().get(&peer), before);
    assert_eq!(f.handshakes_sent_to(peer).len(), 1);
}

#[tokio::test]
async fn rejected_peer_does_not_affect_others() {
    let f = Fixture::new();
    let bad = PeerId::random();
    let good = PeerId::random();

    f.handler
        .handle(bad, Message::BlockAnnounceHandshake(handshake(H256::from_bytes([9; 32]), 1)))
        .await
        .unwrap();
    f.handler
        .handle(good, Message::BlockAnnounceHandshake(handshake(GENESIS, 1)))
        .await
        .unwrap();

    let bad_rec = f.handler.handshakes().get(&bad).unwrap();
    assert!(bad_rec.received() && !bad_rec.is_validated());
    assert!(f.handshakes_sent_to(bad).is_empty());

    let good_rec = f.handler.handshakes().get(&good).unwrap();
    assert!(good_rec.is_complete());
    assert_eq!(f.handshakes_sent_to(good).len(), 1);
}

#[tokio::test]
async fn rejection_keeps_the_stream_alive() {
    let f = Fixture::new();
    let peer = PeerId::random();
    let (tx, mut errors) = mpsc::channel(8);
    let metrics = blocknet::monitoring::metrics::NetworkMetrics::new().unwrap();
    let d = Dispatcher::new(f.handler.clone(), metrics.clone(), tx, MAX);

    let bad_hs = Message::BlockAnnounceHandshake(handshake(H256::from_bytes([9; 32]), 1));
    let stream = stream_of(&[
        bad_hs.encode_for_wire().unwrap(),
        vec![0xff, 0xff],
        Message::BlockAnnounce(announce(11)).encode_for_wire().unwrap(),
    ])
    .await;

    assert_eq!(d.run(peer, stream).await, StreamEnd::Closed);
    assert!(errors.try_recv().is_err());
    assert_eq!(metrics.frames_received_total.get(), 3);
    assert_eq!(metrics.decode_errors_total.get(), 1);
    // Announce from a rejected peer never reaches the syncer.
    assert_eq!(f.syncer.announce_count(), 0);
}

#[tokio::test]
async fn initiator_drops_record_on_bad_reply() {
    let f = Fixture::new();
    let peer = PeerId::random();

    f.handler
        .send_to(peer, Message::BlockAnnounce(announce(11)))
        .await
        .unwrap();
    let rec = f.handler.handshakes().get(&peer).unwrap();
    assert!(rec.is_initiator() && !rec.received());
    assert!(rec.pending_outbound().is_some());
    assert_eq!(f.handshakes_sent_to(peer).len(), 1);

    f.handler
        .handle(peer, Message::BlockAnnounceHandshake(handshake(H256::from_bytes([3; 32]), 5)))
        .await
        .unwrap();
    assert!(f.handler.handshakes().get(&peer).is_none());
    assert!(f.announces_sent_to(peer).is_empty());
}

#[tokio::test]
async fn queued_announce_is_flushed_exactly_once() {
    let f = Fixture::new();
    let peer = PeerId::random();

    f.handler
        .send_to(peer, Message::BlockAnnounce(announce(11)))
        .await
        .unwrap();
    // Replaces the first; only the latest is kept.
    f.handler
        .send_to(peer, Message::BlockAnnounce(announce(12)))
        .await
        .unwrap();
    assert_eq!(f.handshakes_sent_to(peer).len(), 1);

    let reply = Message::BlockAnnounceHandshake(handshake(GENESIS, 40));
    f.handler.handle(peer, reply.clone()).await.unwrap();
    f.handler.handle(peer, reply).await.unwrap();

    let rec = f.handler.handshakes().get(&peer).unwrap();
    assert!(rec.is_complete() && rec.pending_outbound().is_none());
    let announces: Vec<Message> = f
        .host
        .sent_on(BLOCK_ANNOUNCES_PROTOCOL)
        .into_iter()
        .skip(1)
        .map(|s| Message::decode_untagged(MessageType::BlockAnnounce, &s.payload, MAX).unwrap())
        .collect();
    assert_eq!(announces, vec![Message::BlockAnnounce(announce(12))]);

    // Handshake done: the next announce goes straight out.
    f.handler
        .send_to(peer, Message::BlockAnnounce(announce(13)))
        .await
        .unwrap();
    assert_eq!(f.host.sent_on(BLOCK_ANNOUNCES_PROTOCOL).len(), 3);
}

#[tokio::test]
async fn failed_handshake_send_allows_a_fresh_attempt() {
    let f = Fixture::new();
    let peer = PeerId::random();

    f.host.fail_sends(true);
    assert!(f
        .handler
        .send_to(peer, Message::BlockAnnounce(announce(11)))
        .await
        .is_err());
    assert!(f.handler.handshakes().get(&peer).is_none());

    f.host.fail_sends(false);
    f.handler
        .send_to(peer, Message::BlockAnnounce(announce(12)))
        .await
        .unwrap();
    assert_eq!(f.handshakes_sent_to(peer).len(), 1);
}

#[tokio::test]
async fn announce_after_handshake_reaches_syncer_and_requests_blocks() {
    let f = Fixture::new();
    let peer = PeerId::random();
    *f.syncer.request_on_announce.lock() = Some(block_request(5));

    f.handler
        .handle(peer, Message::BlockAnnounceHandshake(handshake(GENESIS, 1)))
        .await
        .unwrap();
    assert!(!f.handler.handshakes().expects_handshake(&peer));

    let payload = Message::BlockAnnounce(announce(11)).encode_for_wire().unwrap();
    let msg = f.handler.decode(&peer, &payload).unwrap();
    f.handler.handle(peer, msg).await.unwrap();

    assert_eq!(f.syncer.announce_count(), 1);
    let requests = f.host.sent_on(SYNC_PROTOCOL);
    assert_eq!(requests.len(), 1);
    assert_eq!(
        Message::decode_tagged(&requests[0].payload, MAX).unwrap(),
        Message::BlockRequest(block_request(5))
    );
    assert_eq!(f.ctx.peers.get(&peer).unwrap().best_block_number, 11);
}

#[tokio::test]
async fn disconnect_forgets_handshake() {
    let f = Fixture::new();
    let peer = PeerId::random();
    f.handler
        .handle(peer, Message::BlockAnnounceHandshake(handshake(GENESIS, 1)))
        .await
        .unwrap();
    f.handler.on_peer_disconnected(&peer);
    assert!(f.handler.handshakes().expects_handshake(&peer));
}
