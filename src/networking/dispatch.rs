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

//! One read loop per inbound stream.
//!
//! Frames are processed strictly in arrival order. Decode failures drop the
//! frame; framing and handler failures end the loop, close the stream and are
//! reported on the service error channel. A finished loop never restarts.

use libp2p::PeerId;
use std::sync::Arc;
use thiserror::Error;
use tokio::{io::AsyncRead, sync::mpsc};
use tracing::{debug, warn};

use crate::{
    monitoring::metrics::NetworkMetrics,
    networking::{
        frame::{FrameError, FrameReader},
        message::ProtocolId,
        protocol::{HandlerError, ProtocolHandler},
    },
};

/// Why a stream was torn down.
#[derive(Debug, Error)]
pub enum StreamErrorKind {
    /// Reading a frame failed.
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    /// The protocol handler failed.
    #[error("handler: {0}")]
    Handler(#[from] HandlerError),
}

/// A stream-fatal error, as reported on the service error channel.
#[derive(Debug, Error)]
#[error("stream {protocol} from {peer}: {kind}")]
pub struct StreamError {
    /// Remote peer.
    pub peer: PeerId,
    /// Stream protocol.
    pub protocol: ProtocolId,
    /// Cause.
    pub kind: StreamErrorKind,
}

/// Receiver of stream errors.
pub type StreamErrorRx = mpsc::Receiver<StreamError>;

/// How a read loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// Remote closed between frames.
    Closed,
    /// Terminated on error; the error was reported.
    Failed,
}

/// Binds inbound streams of one protocol to its handler.
pub struct Dispatcher {
    handler: Arc<dyn ProtocolHandler>,
    metrics: NetworkMetrics,
    errors: mpsc::Sender<StreamError>,
    max_frame_len: usize,
}

impl Dispatcher {
    /// New dispatcher for `handler`'s protocol.
    pub fn new(
        handler: Arc<dyn ProtocolHandler>,
        metrics: NetworkMetrics,
        errors: mpsc::Sender<StreamError>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            handler,
            metrics,
            errors,
            max_frame_len,
        }
    }

    /// Protocol served.
    pub fn protocol(&self) -> ProtocolId {
        self.handler.protocol()
    }

    /// Read, decode and dispatch frames from `stream` until it ends.
    pub async fn run<S>(&self, peer: PeerId, stream: S) -> StreamEnd
    where
        S: AsyncRead + Unpin,
    {
        let protocol = self.protocol();
        let mut reader = FrameReader::new(stream, self.max_frame_len);
        debug!(%peer, %protocol, "inbound stream opened");

        loop {
            let payload = match reader.next_frame().await {
                Ok(Some(p)) => p,
                Ok(None) => {
                    debug!(%peer, %protocol, "inbound stream closed by remote");
                    return StreamEnd::Closed;
                }
                Err(e) => {
                    drop(reader);
                    self.report(peer, e.into());
                    return StreamEnd::Failed;
                }
            };
            self.metrics.frames_received_total.inc();

            let msg = match self.handler.decode(&peer, &payload) {
                Ok(m) => m,
                Err(error) => {
                    self.metrics.decode_errors_total.inc();
                    debug!(%peer, %protocol, %error, len = payload.len(), "dropping undecodable frame");
                    continue;
                }
            };

            if let Err(e) = self.handler.handle(peer, msg).await {
                drop(reader);
                self.report(peer, e.into());
                return StreamEnd::Failed;
            }
        }
    }

    fn report(&self, peer: PeerId, kind: StreamErrorKind) {
        let protocol = self.protocol();
        self.metrics.stream_errors_total.inc();
        warn!(%peer, %protocol, error = %kind, "closing inbound stream");
        let err = StreamError {
            peer,
            protocol,
            kind,
        };
        if let Err(mpsc::error::TrySendError::Full(e)) = self.errors.try_send(err) {
            warn!(error = %e, "stream error channel full; dropping report");
        }
    }
}
