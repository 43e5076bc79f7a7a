//! jujud entry point library
//!
//! One executable serves as the juju agent (`jujud`) and as every hook tool,
//! which it forwards to the agent over RPC. The agent can profile itself,
//! writing CPU and heap profiles to disk.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod forwarder;
pub mod profiling;
pub mod router;

pub use config::ProfilingConfig;
pub use context::{Context, Environment, OsEnvironment, StaticEnvironment};
pub use profiling::{Profiler, ProfilingSession};
pub use router::{Bootstrap, Mode};
