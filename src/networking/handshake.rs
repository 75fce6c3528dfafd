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

//! Per-peer handshake progress for one handshake-gated protocol.
//!
//! Records are only mutated through [`HandshakeStore`], which keeps
//! `validated => received` and never holds its lock across I/O.

use libp2p::PeerId;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::networking::message::{Message, ProtocolId};

/// Handshake progress with one peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeRecord {
    received: bool,
    validated: bool,
    initiated: bool,
    pending_outbound: Option<Message>,
}

impl HandshakeRecord {
    /// We sent our handshake first and wait for the peer's.
    pub fn initiated(pending_outbound: Option<Message>) -> Self {
        Self {
            initiated: true,
            pending_outbound,
            ..Self::default()
        }
    }

    /// Peer's handshake arrived and was accepted.
    pub fn validated() -> Self {
        Self {
            received: true,
            validated: true,
            ..Self::default()
        }
    }

    /// Peer's handshake arrived and was rejected.
    pub fn rejected() -> Self {
        Self {
            received: true,
            ..Self::default()
        }
    }

    /// A handshake was read from the peer.
    pub fn received(&self) -> bool {
        self.received
    }

    /// The received handshake passed validation.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// We opened the exchange by sending our handshake.
    pub fn is_initiator(&self) -> bool {
        self.initiated
    }

    /// Message waiting for the handshake to complete.
    pub fn pending_outbound(&self) -> Option<&Message> {
        self.pending_outbound.as_ref()
    }

    /// Both sides are done; application traffic may flow.
    pub fn is_complete(&self) -> bool {
        self.received && self.validated
    }
}

/// What to do with an outbound message for one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundRoute {
    /// Handshake complete, send the message now.
    SendNow(Message),
    /// No exchange yet. Message was queued; caller must send our handshake.
    SendHandshake,
    /// Exchange in progress. Message replaced any earlier queued one.
    Queued,
    /// Peer failed validation on this protocol.
    Skip,
}

/// Concurrent map of handshake records, keyed by peer.
pub struct HandshakeStore {
    protocol: ProtocolId,
    records: Mutex<BTreeMap<PeerId, HandshakeRecord>>,
}

impl HandshakeStore {
    /// Empty store for `protocol`.
    pub fn new(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Protocol the records belong to.
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// Snapshot of the peer's record.
    pub fn get(&self, peer: &PeerId) -> Option<HandshakeRecord> {
        self.records.lock().get(peer).cloned()
    }

    /// True while the next frame from `peer` must be a handshake.
    pub fn expects_handshake(&self, peer: &PeerId) -> bool {
        self.records.lock().get(peer).map_or(true, |r| !r.received)
    }

    /// Overwrite the peer's record.
    pub fn insert(&self, peer: PeerId, record: HandshakeRecord) {
        self.records.lock().insert(peer, record);
    }

    /// Drop the peer's record.
    pub fn remove(&self, peer: &PeerId) -> Option<HandshakeRecord> {
        self.records.lock().remove(peer)
    }

    /// Record a rejected handshake. Any queued message is discarded.
    pub fn mark_rejected(&self, peer: PeerId) {
        self.insert(peer, HandshakeRecord::rejected());
    }

    /// Accept the peer's handshake as responder, creating the record if needed.
    /// Hands back a message queued concurrently by the send path, if any.
    pub fn accept(&self, peer: PeerId) -> Option<Message> {
        let mut records = self.records.lock();
        let rec = records.entry(peer).or_default();
        rec.received = true;
        rec.validated = true;
        rec.pending_outbound.take()
    }

    /// Mark an existing initiator record validated and hand back the queued message.
    ///
    /// Returns `None` when the record disappeared since the caller last looked.
    pub fn complete(&self, peer: &PeerId) -> Option<Option<Message>> {
        let mut records = self.records.lock();
        let rec = records.get_mut(peer)?;
        rec.received = true;
        rec.validated = true;
        Some(rec.pending_outbound.take())
    }

    /// Decide how `msg` reaches `peer`, creating an initiator record if needed.
    pub fn route_outbound(&self, peer: PeerId, msg: Message) -> OutboundRoute {
        let mut records = self.records.lock();
        match records.get_mut(&peer) {
            None => {
                records.insert(peer, HandshakeRecord::initiated(Some(msg)));
                OutboundRoute::SendHandshake
            }
            Some(rec) if rec.is_complete() => OutboundRoute::SendNow(msg),
            Some(rec) if rec.received => OutboundRoute::Skip,
            Some(rec) => {
                rec.pending_outbound = Some(msg);
                OutboundRoute::Queued
            }
        }
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Forget every peer.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::message::{Transactions, BLOCK_ANNOUNCES_PROTOCOL};

    fn msg(n: u8) -> Message {
        Message::Transactions(Transactions {
            extrinsics: vec![vec![n]],
        })
    }

    #[test]
    fn route_outbound_walks_the_state_machine() {
        let store = HandshakeStore::new(BLOCK_ANNOUNCES_PROTOCOL);
        let peer = PeerId::random();

        assert_eq!(store.route_outbound(peer, msg(1)), OutboundRoute::SendHandshake);
        assert!(store.expects_handshake(&peer));
        assert_eq!(store.route_outbound(peer, msg(2)), OutboundRoute::Queued);

        // Only the latest queued message survives.
        assert_eq!(store.complete(&peer), Some(Some(msg(2))));
        assert_eq!(store.complete(&peer), Some(None));
        assert_eq!(store.route_outbound(peer, msg(3)), OutboundRoute::SendNow(msg(3)));

        store.mark_rejected(peer);
        assert_eq!(store.route_outbound(peer, msg(4)), OutboundRoute::Skip);
        assert!(!store.expects_handshake(&peer));
    }

    #[test]
    fn accept_creates_validated_record() {
        let store = HandshakeStore::new(BLOCK_ANNOUNCES_PROTOCOL);
        let peer = PeerId::random();
        assert_eq!(store.accept(peer), None);
        let rec = store.get(&peer).unwrap();
        assert!(rec.received() && rec.is_validated() && !rec.is_initiator());
    }

    #[test]
    fn complete_reports_missing_record() {
        let store = HandshakeStore::new(BLOCK_ANNOUNCES_PROTOCOL);
        assert_eq!(store.complete(&PeerId::random()), None);
    }
}
