#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: framing, protocol handlers, handshake state and the service.

pub mod block_announce;
pub mod collaborators;
pub mod context;
pub mod dispatch;
pub mod frame;
pub mod handshake;
pub mod host;
pub mod legacy;
pub mod memory_host;
pub mod message;
pub mod p2p_identity;
pub mod protocol;
pub mod request_tracker;
pub mod service;
pub mod sync;
