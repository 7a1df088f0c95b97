//! Non-blocking, timeout-bounded client for legacy text gateways.
//!
//! A [`GatewayClient`] owns one TCP connection and one readiness poll. Each call
//! (`connect`, `write`, `read`) blocks the calling thread until the socket is ready
//! or the caller's deadline passes.

pub mod codec;
pub mod config;
pub mod errors;
pub mod network;

pub use config::GatewayConfig;
pub use errors::{GatewayError, Result};
pub use network::{
    interface::{exchange, Transport},
    tcp::{GatewayClient, Readiness, Reply},
};
