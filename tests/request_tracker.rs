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

use blocknet::networking::{message::FromBlock, request_tracker::RequestTracker};
use libp2p::PeerId;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

#[test]
fn add_has_remove() {
    let t = RequestTracker::new();
    assert!(!t.has(42));
    assert!(t.add(42));
    assert!(!t.add(42), "second add keeps the first entry");
    assert!(t.has(42));
    assert!(t.remove(42));
    assert!(!t.has(42));
    assert!(!t.remove(42));
    assert!(t.is_empty());
}

#[test]
fn track_keeps_target() {
    let t = RequestTracker::new();
    let peer = PeerId::random();
    assert!(t.track(7, peer, Some(FromBlock::Number(100))));
    assert_eq!(t.target(7), Some(FromBlock::Number(100)));
    assert_eq!(t.peer(7), Some(peer));
    assert!(t.add(8));
    assert_eq!(t.target(8), None);
    assert_eq!(t.len(), 2);
    t.clear();
    assert!(t.is_empty());
}

#[test]
fn remove_peer_drops_only_that_peers_requests() {
    let t = RequestTracker::new();
    let gone = PeerId::random();
    let stays = PeerId::random();
    t.track(1, gone, None);
    t.track(2, gone, Some(FromBlock::Number(5)));
    t.track(3, stays, None);
    t.add(4);

    assert_eq!(t.remove_peer(&gone), 2);
    assert!(!t.has(1) && !t.has(2));
    assert!(t.has(3) && t.has(4));
    assert_eq!(t.remove_peer(&gone), 0);

    // The id is free again for a retry.
    assert!(t.track(1, stays, None));
}

#[test]
fn concurrent_consumers_see_one_winner() {
    let t = Arc::new(RequestTracker::new());
    for id in 0..64u64 {
        t.add(id);
    }
    let wins = Arc::new(AtomicUsize::new(0));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let t = t.clone();
            let wins = wins.clone();
            thread::spawn(move || {
                for id in 0..64u64 {
                    if t.remove(id) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for th in threads {
        th.join().unwrap();
    }
    assert_eq!(wins.load(Ordering::SeqCst), 64);
    assert!(t.is_empty());
}
