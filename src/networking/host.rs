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

//! Transport abstraction consumed by the network service.
//!
//! A host owns connections and multiplexes protocol streams over them. It is
//! responsible for framing outbound payloads; inbound streams are handed over
//! raw and framed by the service.

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::warn;

use crate::networking::message::ProtocolId;

/// Transport errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// No connection to the peer.
    #[error("not connected to {0}")]
    NotConnected(PeerId),
    /// Peer has no handler for the protocol.
    #[error("protocol {0} not supported by remote")]
    ProtocolNotSupported(ProtocolId),
    /// Host was closed.
    #[error("host closed")]
    Closed,
    /// Stream I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw inbound stream.
pub type InboundStream = Box<dyn AsyncRead + Send + Unpin>;

/// Called once per accepted inbound stream.
pub type StreamHandler = Arc<dyn Fn(PeerId, InboundStream) + Send + Sync>;

/// An established connection.
#[derive(Clone, Debug)]
pub struct Conn {
    /// Remote identity.
    pub remote_peer: PeerId,
    /// Remote address, if known.
    pub remote_addr: Option<Multiaddr>,
}

/// Connection lifecycle notification.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// New connection.
    Established(Conn),
    /// Last connection to the peer went away.
    Closed(PeerId),
}

/// Called on every connection lifecycle change.
pub type ConnectionHandler = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Host/transport collaborator.
#[async_trait]
pub trait Host: Send + Sync {
    /// Our identity.
    fn local_peer_id(&self) -> PeerId;

    /// Route inbound streams for `protocol` to `handler`.
    fn register_stream_handler(&self, protocol: ProtocolId, handler: StreamHandler);

    /// Receive connection lifecycle callbacks.
    fn set_connection_handler(&self, handler: ConnectionHandler);

    /// Send one framed payload to `peer` on `protocol`.
    async fn send(
        &self,
        peer: PeerId,
        protocol: ProtocolId,
        payload: Vec<u8>,
    ) -> Result<(), HostError>;

    /// Connected peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Listen addresses.
    fn multiaddrs(&self) -> Vec<Multiaddr>;

    /// Addresses dialled by [`Host::bootstrap`].
    fn set_bootstrap_addrs(&self, addrs: Vec<Multiaddr>);

    /// Dial the bootstrap addresses.
    async fn bootstrap(&self) -> Result<(), HostError>;

    /// Close every connection and stream.
    async fn close(&self) -> Result<(), HostError>;

    /// Send to every connected peer. Per-peer failures are logged.
    async fn broadcast(&self, protocol: ProtocolId, payload: Vec<u8>) {
        for peer in self.peers() {
            if let Err(error) = self.send(peer, protocol, payload.clone()).await {
                warn!(%peer, %protocol, %error, "broadcast send failed");
            }
        }
    }
}
