//! Shared types and utilities for jujud
//!
//! This crate contains the hook command request/response types, the wire
//! protocol spoken between hook tools and the agent, and small helpers used by
//! both sides.

pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::command::*;
