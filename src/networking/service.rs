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

//! Network service: wires protocol handlers to the host and runs background upkeep.
//!
//! Lifecycle: [`NetworkService::new`] -> [`NetworkService::start`] ->
//! [`NetworkService::stop`]. A stopped service cannot be restarted.

use libp2p::{Multiaddr, PeerId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    core::config::{ConfigError, NetworkConfig},
    monitoring::metrics::NetworkMetrics,
    networking::{
        block_announce::BlockAnnounceHandler,
        collaborators::{BlockState, MessageHandler, Syncer},
        context::{NetworkContext, PeerBook, PeerInfo},
        dispatch::{Dispatcher, StreamError, StreamErrorRx},
        handshake::HandshakeStore,
        host::{ConnectionEvent, Host, HostError, InboundStream},
        legacy::LegacyHandler,
        message::{BlockRequest, Message},
        protocol::{HandlerError, ProtocolHandler, ProtocolRegistry, RegistryError},
        request_tracker::RequestTracker,
        sync::SyncHandler,
    },
};

/// Service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid configuration.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Handler registration failed.
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    /// Transport failure.
    #[error("host: {0}")]
    Host(#[from] HostError),
    /// Sending failed.
    #[error("handler: {0}")]
    Handler(#[from] HandlerError),
    /// `start` called twice.
    #[error("service already started")]
    AlreadyStarted,
    /// `stop` before `start`, or after `stop`.
    #[error("service not running")]
    NotRunning,
}

/// Aggregate health.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HealthInfo {
    /// Connected peers.
    pub peers: usize,
    /// Syncer is catching up.
    pub is_syncing: bool,
    /// Node is configured to find peers.
    pub should_have_peers: bool,
}

/// Local network identity and addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkStateInfo {
    /// Local peer id (base58).
    pub peer_id: String,
    /// Listen addresses.
    pub multiaddrs: Vec<String>,
    /// Client name, version and build.
    pub client_version: String,
}

/// `blocknet/<version>[-<git sha>]`.
pub fn client_version() -> String {
    let mut v = format!("blocknet/{}", env!("CARGO_PKG_VERSION"));
    if let Some(sha) = option_env!("VERGEN_GIT_SHA") {
        let short: String = sha.chars().take(8).collect();
        if !short.is_empty() && !short.starts_with("VERGEN") {
            v.push('-');
            v.push_str(&short);
        }
    }
    v
}

/// External collaborators the service is built from.
pub struct ServiceDeps {
    /// Transport.
    pub host: Arc<dyn Host>,
    /// Local chain view.
    pub block_state: Arc<dyn BlockState>,
    /// Sync decisions.
    pub syncer: Arc<dyn Syncer>,
    /// Receiver of gossiped transactions.
    pub message_handler: Option<Arc<dyn MessageHandler>>,
    /// Metrics sink.
    pub metrics: NetworkMetrics,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Clone)]
struct Snapshot {
    health: HealthInfo,
    state: NetworkStateInfo,
}

/// The network service.
pub struct NetworkService {
    ctx: Arc<NetworkContext>,
    registry: ProtocolRegistry,
    block_announce: Arc<BlockAnnounceHandler>,
    legacy: Arc<LegacyHandler>,
    errors_tx: mpsc::Sender<StreamError>,
    snapshot: Arc<RwLock<Snapshot>>,
    shutdown: watch::Sender<bool>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
}

impl NetworkService {
    /// Build the service and the receiver of stream-fatal errors.
    pub fn new(
        config: NetworkConfig,
        deps: ServiceDeps,
    ) -> Result<(Self, StreamErrorRx), ServiceError> {
        config.validate()?;
        deps.host.set_bootstrap_addrs(config.bootstrap_multiaddrs()?);
        let (errors_tx, errors_rx) = mpsc::channel(config.error_channel_capacity);

        let ctx = Arc::new(NetworkContext {
            host: deps.host,
            block_state: deps.block_state,
            syncer: deps.syncer,
            metrics: deps.metrics,
            tracker: RequestTracker::new(),
            peers: PeerBook::default(),
            config,
        });

        let block_announce = Arc::new(BlockAnnounceHandler::new(ctx.clone()));
        let sync = Arc::new(SyncHandler::new(ctx.clone()));
        let legacy = Arc::new(LegacyHandler::new(ctx.clone(), deps.message_handler));

        let mut registry = ProtocolRegistry::new();
        registry.register(block_announce.clone())?;
        registry.register(sync)?;
        registry.register(legacy.clone())?;

        let snapshot = Arc::new(RwLock::new(compute_snapshot(&ctx)));
        let (shutdown, _) = watch::channel(false);

        Ok((
            Self {
                ctx,
                registry,
                block_announce,
                legacy,
                errors_tx,
                snapshot,
                shutdown,
                refresh_task: Mutex::new(None),
                state: AtomicU8::new(IDLE),
            },
            errors_rx,
        ))
    }

    /// Register stream handlers, bootstrap and start the refresh loop.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<(), ServiceError> {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::AlreadyStarted);
        }

        let host = &self.ctx.host;
        for handler in self.registry.handlers() {
            let dispatcher = Arc::new(Dispatcher::new(
                handler.clone(),
                self.ctx.metrics.clone(),
                self.errors_tx.clone(),
                self.ctx.config.max_frame_len,
            ));
            host.register_stream_handler(
                dispatcher.protocol(),
                Arc::new(move |peer: PeerId, stream: InboundStream| {
                    let d = dispatcher.clone();
                    tokio::spawn(async move {
                        d.run(peer, stream).await;
                    });
                }),
            );
        }

        let ctx = self.ctx.clone();
        let handlers: Vec<Arc<dyn ProtocolHandler>> = self.registry.handlers().cloned().collect();
        let legacy = self.legacy.clone();
        host.set_connection_handler(Arc::new(move |ev: ConnectionEvent| {
            on_connection_event(&ctx, &handlers, &legacy, ev);
        }));

        for peer in host.peers() {
            self.ctx.peers.insert(peer);
        }
        self.ctx.metrics.peers.set(self.ctx.peers.len() as i64);

        if !self.ctx.config.no_bootstrap {
            if let Err(error) = host.bootstrap().await {
                warn!(%error, "bootstrap failed; continuing without it");
            }
        }

        *self.snapshot.write() = compute_snapshot(&self.ctx);
        let task = spawn_refresh_loop(
            self.ctx.clone(),
            self.snapshot.clone(),
            self.shutdown.subscribe(),
        );
        *self.refresh_task.lock() = Some(task);

        info!(
            peer_id = %host.local_peer_id(),
            protocols = ?self.registry.protocols(),
            "network service started"
        );
        Ok(())
    }

    /// Stop the refresh loop, close the host and drop all per-peer state.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        if self
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::NotRunning);
        }

        self.shutdown.send_replace(true);
        let task = self.refresh_task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(%error, "refresh loop ended abnormally");
            }
        }

        // Closing the host ends every inbound stream, which ends its read loop.
        let closed = self.ctx.host.close().await;

        for handler in self.registry.handlers() {
            handler.reset();
        }
        self.ctx.peers.clear();
        self.ctx.metrics.peers.set(0);
        info!("network service stopped");

        closed.map_err(ServiceError::from)
    }

    /// Send a message produced by another subsystem.
    ///
    /// Announces are gated on the block-announce handshake per peer and fanned
    /// out to every connected peer; transactions are gossiped; status is
    /// broadcast. Block requests need a target peer, see [`Self::request_blocks`].
    pub async fn send_message(&self, msg: Message) {
        match msg {
            m @ Message::BlockAnnounce(_) => self.block_announce.broadcast(m).await,
            m @ Message::Transactions(_) => {
                if let Err(error) = self.legacy.gossip(&m, None).await {
                    warn!(%error, "transaction gossip failed");
                }
            }
            m @ Message::Status(_) => match m.encode_for_wire() {
                Ok(payload) => self.ctx.host.broadcast(m.protocol(), payload).await,
                Err(error) => warn!(%error, "cannot encode status"),
            },
            other => {
                warn!(ty = ?other.message_type(), "message type cannot be broadcast; dropping");
            }
        }
    }

    /// Track `req` and send it to `peer`.
    pub async fn request_blocks(&self, peer: PeerId, req: BlockRequest) -> Result<(), ServiceError> {
        self.ctx.request_blocks(peer, req).await?;
        Ok(())
    }

    /// Last computed health.
    pub fn health(&self) -> HealthInfo {
        self.snapshot.read().health.clone()
    }

    /// Last computed network state.
    pub fn network_state(&self) -> NetworkStateInfo {
        self.snapshot.read().state.clone()
    }

    /// Connected peers, ordered by id.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.ctx.peers.snapshot()
    }

    /// Block-announce handshake records.
    pub fn block_announce_handshakes(&self) -> &HandshakeStore {
        self.block_announce.handshakes()
    }

    /// Outstanding block requests.
    pub fn request_tracker(&self) -> &RequestTracker {
        &self.ctx.tracker
    }

    /// Registered protocol handlers.
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Metrics.
    pub fn metrics(&self) -> &NetworkMetrics {
        &self.ctx.metrics
    }
}

fn on_connection_event(
    ctx: &Arc<NetworkContext>,
    handlers: &[Arc<dyn ProtocolHandler>],
    legacy: &Arc<LegacyHandler>,
    ev: ConnectionEvent,
) {
    match ev {
        ConnectionEvent::Established(conn) => {
            let peer = conn.remote_peer;
            if !ctx.peers.insert(peer) {
                return;
            }
            ctx.metrics.peers.set(ctx.peers.len() as i64);
            debug!(%peer, addr = ?conn.remote_addr, "peer connected");

            let legacy = legacy.clone();
            tokio::spawn(async move {
                if let Err(error) = legacy.send_status(peer).await {
                    warn!(%peer, %error, "failed to send status");
                }
            });
        }
        ConnectionEvent::Closed(peer) => {
            ctx.peers.remove(&peer);
            for h in handlers {
                h.on_peer_disconnected(&peer);
            }
            ctx.metrics.peers.set(ctx.peers.len() as i64);
            debug!(%peer, "peer disconnected");
        }
    }
}

fn compute_snapshot(ctx: &NetworkContext) -> Snapshot {
    let peers = ctx.peers.len();
    Snapshot {
        health: HealthInfo {
            peers,
            is_syncing: !ctx.syncer.is_synced(),
            should_have_peers: !ctx.config.no_bootstrap,
        },
        state: NetworkStateInfo {
            peer_id: ctx.host.local_peer_id().to_base58(),
            multiaddrs: ctx.host.multiaddrs().iter().map(Multiaddr::to_string).collect(),
            client_version: client_version(),
        },
    }
}

fn spawn_refresh_loop(
    ctx: Arc<NetworkContext>,
    snapshot: Arc<RwLock<Snapshot>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = ctx.config.refresh_interval();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let snap = compute_snapshot(&ctx);
                    ctx.metrics.peers.set(snap.health.peers as i64);
                    debug!(
                        peers = snap.health.peers,
                        syncing = snap.health.is_syncing,
                        "network state refreshed"
                    );
                    *snapshot.write() = snap;
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("refresh loop stopped");
    })
}
