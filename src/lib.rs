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

//! Blocknet - peer-to-peer networking layer for a block-producing node.
//!
//! This crate provides:
//! - Length-prefixed (LEB128) stream framing
//! - Per-protocol decoders and handlers (`/block-announces/1`, `/sync/2`, `/legacy/1`)
//! - Handshake-gated block announcements with per-peer state
//! - Block request tracking and response matching
//! - A network service that wires handlers to a pluggable transport
//! - Monitoring via Prometheus metrics and structured logging

/// Core primitives (types, canonical encoding, configuration).
pub mod core;
/// Observability (metrics, logging setup).
pub mod monitoring;
/// Protocol handling and the network service.
pub mod networking;
