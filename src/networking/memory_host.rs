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

//! In-process [`Host`] over `tokio::io::duplex` pipes.
//!
//! Each (sender, receiver, protocol) triple gets one unidirectional stream,
//! opened on first send and handed to the receiver's stream handler. Closing
//! or disconnecting drops the write halves, so the receiving read loops see EOF.

use async_trait::async_trait;
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::io::DuplexStream;
use tracing::{debug, warn};

use crate::networking::{
    frame::{write_frame, FrameError},
    host::{
        Conn, ConnectionEvent, ConnectionHandler, Host, HostError, StreamHandler,
    },
    message::ProtocolId,
};

/// Per-stream pipe buffer.
const PIPE_CAPACITY: usize = 64 * 1024;

type OutboundStream = Arc<tokio::sync::Mutex<DuplexStream>>;

struct HostState {
    peer_id: PeerId,
    addr: Multiaddr,
    handlers: Mutex<BTreeMap<ProtocolId, StreamHandler>>,
    conn_handler: Mutex<Option<ConnectionHandler>>,
    connected: Mutex<BTreeSet<PeerId>>,
    outbound: Mutex<BTreeMap<(PeerId, ProtocolId), OutboundStream>>,
    bootstrap: Mutex<Vec<PeerId>>,
    closed: AtomicBool,
}

impl HostState {
    fn notify(&self, ev: ConnectionEvent) {
        let handler = self.conn_handler.lock().clone();
        if let Some(h) = handler {
            h(ev);
        }
    }

    fn drop_streams_to(&self, peer: &PeerId) {
        self.outbound.lock().retain(|(p, _), _| p != peer);
    }
}

#[derive(Default)]
struct Hub {
    hosts: Mutex<BTreeMap<PeerId, Arc<HostState>>>,
    next_port: AtomicU64,
}

impl Hub {
    fn get(&self, peer: &PeerId) -> Option<Arc<HostState>> {
        self.hosts.lock().get(peer).cloned()
    }
}

/// A set of in-process hosts that can be wired together.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

impl MemoryNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host with a fresh identity.
    pub fn add_host(&self) -> Arc<MemoryHost> {
        self.add_host_with_id(PeerId::random())
    }

    /// Add a host with the given identity.
    pub fn add_host_with_id(&self, peer_id: PeerId) -> Arc<MemoryHost> {
        let port = self.hub.next_port.fetch_add(1, Ordering::Relaxed) + 1;
        let addr = Multiaddr::empty()
            .with(Protocol::Memory(port))
            .with(Protocol::P2p(peer_id));
        let state = Arc::new(HostState {
            peer_id,
            addr,
            handlers: Mutex::new(BTreeMap::new()),
            conn_handler: Mutex::new(None),
            connected: Mutex::new(BTreeSet::new()),
            outbound: Mutex::new(BTreeMap::new()),
            bootstrap: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.hub.hosts.lock().insert(peer_id, state.clone());
        Arc::new(MemoryHost {
            state,
            hub: self.hub.clone(),
        })
    }

    /// Connect two hosts and notify both.
    pub fn connect(&self, a: &PeerId, b: &PeerId) -> Result<(), HostError> {
        connect(&self.hub, a, b)
    }

    /// Disconnect two hosts, dropping their streams, and notify both.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        disconnect(&self.hub, a, b)
    }
}

fn connect(hub: &Hub, a: &PeerId, b: &PeerId) -> Result<(), HostError> {
    let ha = hub.get(a).ok_or(HostError::NotConnected(*a))?;
    let hb = hub.get(b).ok_or(HostError::NotConnected(*b))?;
    if ha.closed.load(Ordering::Acquire) || hb.closed.load(Ordering::Acquire) {
        return Err(HostError::Closed);
    }
    let new_a = ha.connected.lock().insert(*b);
    let new_b = hb.connected.lock().insert(*a);
    if new_a {
        ha.notify(ConnectionEvent::Established(Conn {
            remote_peer: *b,
            remote_addr: Some(hb.addr.clone()),
        }));
    }
    if new_b {
        hb.notify(ConnectionEvent::Established(Conn {
            remote_peer: *a,
            remote_addr: Some(ha.addr.clone()),
        }));
    }
    Ok(())
}

fn disconnect(hub: &Hub, a: &PeerId, b: &PeerId) {
    let (Some(ha), Some(hb)) = (hub.get(a), hub.get(b)) else {
        return;
    };
    ha.drop_streams_to(b);
    hb.drop_streams_to(a);
    if ha.connected.lock().remove(b) {
        ha.notify(ConnectionEvent::Closed(*b));
    }
    if hb.connected.lock().remove(a) {
        hb.notify(ConnectionEvent::Closed(*a));
    }
}

/// One endpoint of a [`MemoryNetwork`].
pub struct MemoryHost {
    state: Arc<HostState>,
    hub: Arc<Hub>,
}

impl MemoryHost {
    /// Protocols with a registered stream handler.
    pub fn protocols(&self) -> Vec<ProtocolId> {
        self.state.handlers.lock().keys().copied().collect()
    }

    fn open_stream(&self, peer: PeerId, protocol: ProtocolId) -> Result<OutboundStream, HostError> {
        if let Some(s) = self.state.outbound.lock().get(&(peer, protocol)) {
            return Ok(s.clone());
        }
        let remote = self.hub.get(&peer).ok_or(HostError::NotConnected(peer))?;
        let handler = remote
            .handlers
            .lock()
            .get(&protocol)
            .cloned()
            .ok_or(HostError::ProtocolNotSupported(protocol))?;

        let (local, far) = tokio::io::duplex(PIPE_CAPACITY);
        let local = Arc::new(tokio::sync::Mutex::new(local));
        {
            let mut outbound = self.state.outbound.lock();
            // Lost a race with a concurrent opener; use theirs.
            if let Some(s) = outbound.get(&(peer, protocol)) {
                return Ok(s.clone());
            }
            outbound.insert((peer, protocol), local.clone());
        }
        debug!(from = %self.state.peer_id, to = %peer, %protocol, "opened memory stream");
        handler(self.state.peer_id, Box::new(far));
        Ok(local)
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn local_peer_id(&self) -> PeerId {
        self.state.peer_id
    }

    fn register_stream_handler(&self, protocol: ProtocolId, handler: StreamHandler) {
        self.state.handlers.lock().insert(protocol, handler);
    }

    fn set_connection_handler(&self, handler: ConnectionHandler) {
        *self.state.conn_handler.lock() = Some(handler);
    }

    async fn send(
        &self,
        peer: PeerId,
        protocol: ProtocolId,
        payload: Vec<u8>,
    ) -> Result<(), HostError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(HostError::Closed);
        }
        if !self.state.connected.lock().contains(&peer) {
            return Err(HostError::NotConnected(peer));
        }
        let stream = self.open_stream(peer, protocol)?;
        let mut s = stream.lock().await;
        if let Err(e) = write_frame(&mut *s, &payload).await {
            drop(s);
            // Reader went away; the next send opens a fresh stream.
            self.state.outbound.lock().remove(&(peer, protocol));
            return Err(match e {
                FrameError::Io(err) => HostError::Io(err),
                other => HostError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
            });
        }
        Ok(())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.state.connected.lock().iter().copied().collect()
    }

    fn multiaddrs(&self) -> Vec<Multiaddr> {
        vec![self.state.addr.clone()]
    }

    fn set_bootstrap_addrs(&self, addrs: Vec<Multiaddr>) {
        // Memory addresses are only reachable through their `/p2p/` component.
        let peers = addrs
            .iter()
            .filter_map(|a| {
                a.iter().find_map(|p| match p {
                    Protocol::P2p(id) => Some(id),
                    _ => None,
                })
            })
            .collect();
        *self.state.bootstrap.lock() = peers;
    }

    async fn bootstrap(&self) -> Result<(), HostError> {
        let peers = self.state.bootstrap.lock().clone();
        for peer in peers {
            if let Err(error) = connect(&self.hub, &self.state.peer_id, &peer) {
                warn!(%peer, %error, "bootstrap dial failed");
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HostError> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let peers = self.peers();
        for peer in peers {
            disconnect(&self.hub, &self.state.peer_id, &peer);
        }
        self.state.outbound.lock().clear();
        Ok(())
    }
}
