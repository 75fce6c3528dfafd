#![forbid(unsafe_code)]

//! Core primitives: hashes, canonical encoding and configuration.

pub mod config;
pub mod types;
