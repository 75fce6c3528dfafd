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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric construction or registration failed.
    #[error("prometheus")]
    Prom,
}

/// Network service metrics.
#[derive(Clone)]
pub struct NetworkMetrics {
    /// Registry.
    pub registry: Registry,

    /// Connected peers gauge.
    pub peers: IntGauge,
    /// Non-empty frames read off inbound streams.
    pub frames_received_total: IntCounter,
    /// Messages handed to the host for sending.
    pub messages_sent_total: IntCounter,
    /// Frames dropped because they did not decode.
    pub decode_errors_total: IntCounter,
    /// Streams terminated by a framing or handler error.
    pub stream_errors_total: IntCounter,
    /// Handshakes rejected during validation.
    pub handshake_failures_total: IntCounter,
    /// Block responses whose id was not tracked.
    pub unsolicited_responses_total: IntCounter,
    /// Gossip messages already seen.
    pub gossip_duplicates_total: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

impl NetworkMetrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let peers = IntGauge::new("blocknet_net_peers", "Connected peers")
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(peers.clone()))
            .map_err(|_| MetricsError::Prom)?;

        let frames_received_total = counter(
            &registry,
            "blocknet_net_frames_received_total",
            "Frames read off inbound streams",
        )?;
        let messages_sent_total = counter(
            &registry,
            "blocknet_net_messages_sent_total",
            "Messages sent to peers",
        )?;
        let decode_errors_total = counter(
            &registry,
            "blocknet_net_decode_errors_total",
            "Frames dropped on decode failure",
        )?;
        let stream_errors_total = counter(
            &registry,
            "blocknet_net_stream_errors_total",
            "Streams closed on framing or handler error",
        )?;
        let handshake_failures_total = counter(
            &registry,
            "blocknet_net_handshake_failures_total",
            "Rejected handshakes",
        )?;
        let unsolicited_responses_total = counter(
            &registry,
            "blocknet_net_unsolicited_responses_total",
            "Block responses with untracked ids",
        )?;
        let gossip_duplicates_total = counter(
            &registry,
            "blocknet_net_gossip_duplicates_total",
            "Duplicate gossip messages dropped",
        )?;

        Ok(Self {
            registry,
            peers,
            frames_received_total,
            messages_sent_total,
            decode_errors_total,
            stream_errors_total,
            handshake_failures_total,
            unsolicited_responses_total,
            gossip_duplicates_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_are_registered() {
        let m = NetworkMetrics::new().unwrap();
        m.decode_errors_total.inc();
        m.peers.set(3);
        let families = m.registry.gather();
        assert_eq!(families.len(), 8);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "blocknet_net_decode_errors_total"));
    }
}
