//! Data types exchanged between hook tools and the agent

pub mod command;

pub use command::{ExitCode, Request, Response};
