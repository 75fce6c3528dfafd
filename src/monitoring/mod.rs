#![forbid(unsafe_code)]

//! Observability: prometheus metrics and tracing setup.

pub mod logging;
pub mod metrics;
