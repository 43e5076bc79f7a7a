//! Hook command request/response types
//!
//! These are the values exchanged between a hook tool (a symlink to `jujud`)
//! and the unit agent that executes the command on its behalf.

use serde::{Deserialize, Serialize};

/// Exit code reported by a hook command
pub type ExitCode = i32;

/// A request to run one hook command in a running agent's context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Identifies the hook execution context inside the agent
    pub context_id: String,

    /// Absolute working directory of the invoking process
    pub dir: String,

    /// Name the hook tool was invoked as (e.g. `relation-get`)
    pub command_name: String,

    /// Arguments, excluding argv[0]
    pub args: Vec<String>,
}

impl Request {
    pub fn new(
        context_id: impl Into<String>,
        dir: impl Into<String>,
        command_name: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            dir: dir.into(),
            command_name: command_name.into(),
            args,
        }
    }
}

/// The outcome of a hook command, produced by the agent.
///
/// Output is carried as raw bytes and must be relayed without decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub code: ExitCode,
}

impl Response {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, code: ExitCode) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            code,
        }
    }

    /// Whether the remote command reported success
    pub fn success(&self) -> bool {
        self.code == 0
    }
}
