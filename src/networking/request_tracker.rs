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

//! In-flight block requests, keyed by correlation id.
//!
//! Entries remember the peer the request went to, so a disconnect drops that
//! peer's outstanding ids and the syncer's retry is not mistaken for a duplicate.

use libp2p::PeerId;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::networking::message::FromBlock;

#[derive(Clone, Copy, Debug)]
struct Pending {
    peer: Option<PeerId>,
    target: Option<FromBlock>,
}

/// Outstanding block requests.
#[derive(Default)]
pub struct RequestTracker {
    pending: Mutex<BTreeMap<u64, Pending>>,
}

impl RequestTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` with no peer attached. Returns false (and keeps the existing entry) if already tracked.
    pub fn add(&self, id: u64) -> bool {
        self.insert(id, Pending { peer: None, target: None })
    }

    /// Register `id` as sent to `peer`, together with the block it starts from.
    pub fn track(&self, id: u64, peer: PeerId, target: Option<FromBlock>) -> bool {
        self.insert(
            id,
            Pending {
                peer: Some(peer),
                target,
            },
        )
    }

    fn insert(&self, id: u64, entry: Pending) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return false;
        }
        pending.insert(id, entry);
        true
    }

    /// True if `id` awaits a response.
    pub fn has(&self, id: u64) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Consume `id`. Only the first call for a tracked id returns true.
    pub fn remove(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Drop every request sent to `peer`. Returns how many were dropped.
    pub fn remove_peer(&self, peer: &PeerId) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, e| e.peer.as_ref() != Some(peer));
        before - pending.len()
    }

    /// Peer a tracked request was sent to.
    pub fn peer(&self, id: u64) -> Option<PeerId> {
        self.pending.lock().get(&id).and_then(|e| e.peer)
    }

    /// Start block of a tracked request.
    pub fn target(&self, id: u64) -> Option<FromBlock> {
        self.pending.lock().get(&id).and_then(|e| e.target)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}
