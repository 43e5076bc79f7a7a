//! Hook command protocol
//!
//! This module defines how a hook tool asks a running agent to execute a
//! command: the wire envelope, its errors, and (with the `rpc` feature) the
//! Unix socket client and server.

pub mod error;
pub mod wire;

#[cfg(feature = "rpc")]
pub mod rpc;

pub use error::RpcError;
pub use wire::{Call, Reply, JUJUC_MAIN, PROTOCOL_VERSION};
