//! Hook command forwarding
//!
//! Hook tools are symlinks to this executable. When invoked under a tool name,
//! the process asks the running unit agent (reachable through
//! `JUJU_AGENT_SOCKET`) to execute the command inside the hook context named by
//! `JUJU_CONTEXT_ID`, then relays the agent's output and exit code unchanged.

use crate::context::Context;
use jujud_shared::protocol::rpc::Client;
use jujud_shared::protocol::{RpcError, JUJUC_MAIN};
use jujud_shared::types::command::{ExitCode, Request};
use std::io::{self, Write};
use tracing::{debug, warn};

/// Hook execution context the command belongs to
pub const CONTEXT_ID_VAR: &str = "JUJU_CONTEXT_ID";

/// Path of the agent's Unix socket
pub const AGENT_SOCKET_VAR: &str = "JUJU_AGENT_SOCKET";

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("{0} not set")]
    NotSet(&'static str),

    #[error("getwd")]
    WorkingDir(#[source] io::Error),

    #[error("working directory {0:?} is not valid unicode")]
    NonUnicodeDir(std::path::PathBuf),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

fn required(ctx: &Context<'_>, key: &'static str) -> Result<String, ForwardError> {
    ctx.getenv(key).ok_or(ForwardError::NotSet(key))
}

/// Resolve the request from the environment without touching the transport.
///
/// Returns the request and the socket path to send it to.
pub fn build_request(
    ctx: &Context<'_>,
    command_name: &str,
    args: &[String],
) -> Result<(Request, String), ForwardError> {
    let context_id = required(ctx, CONTEXT_ID_VAR)?;
    let dir = ctx.getwd().map_err(ForwardError::WorkingDir)?;
    let dir = dir
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| ForwardError::NonUnicodeDir(dir.clone()))?;
    let socket_path = required(ctx, AGENT_SOCKET_VAR)?;

    let req = Request::new(context_id, dir, command_name, args.to_vec());
    Ok((req, socket_path))
}

/// Run `command_name` with `args` (argv[1:]) in the agent and relay the result.
///
/// Returns the remote exit code. A non-zero code is the command's own outcome,
/// not an error; errors are reserved for failures to reach or talk to the agent.
pub async fn run_hook_command(
    ctx: &mut Context<'_>,
    command_name: &str,
    args: &[String],
) -> Result<ExitCode, ForwardError> {
    let (req, socket_path) = build_request(ctx, command_name, args)?;

    // On error paths the connection closes when `client` drops.
    let mut client = Client::dial(&socket_path).await?;
    debug!("forwarding {} to {}", command_name, socket_path);
    let resp = client.call(JUJUC_MAIN, req).await?;
    if let Err(e) = client.close().await {
        debug!("closing connection to {}: {}", socket_path, e);
    }
    if !resp.success() {
        debug!("{} exited with code {}", command_name, resp.code);
    }

    relay(ctx.stdout, &resp.stdout, "stdout");
    relay(ctx.stderr, &resp.stderr, "stderr");
    Ok(resp.code)
}

fn relay(w: &mut dyn Write, bytes: &[u8], stream: &str) {
    if let Err(e) = w.write_all(bytes).and_then(|_| w.flush()) {
        warn!("writing hook command {}: {}", stream, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticEnvironment;

    fn full_env() -> StaticEnvironment {
        StaticEnvironment::new()
            .with_var(CONTEXT_ID_VAR, "mysql/0:db-relation-changed:1234")
            .with_var(AGENT_SOCKET_VAR, "/var/lib/juju/agents/unit-mysql-0/agent.socket")
            .with_dir("/var/lib/juju/agents/unit-mysql-0/charm")
    }

    #[test]
    fn test_build_request() {
        let env = full_env();
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let ctx = Context::new(&env, &mut out, &mut err);

        let (req, socket) =
            build_request(&ctx, "relation-get", &["-r".to_string(), "db:2".to_string()]).unwrap();
        assert_eq!(req.context_id, "mysql/0:db-relation-changed:1234");
        assert_eq!(req.dir, "/var/lib/juju/agents/unit-mysql-0/charm");
        assert_eq!(req.command_name, "relation-get");
        assert_eq!(req.args, vec!["-r".to_string(), "db:2".to_string()]);
        assert_eq!(socket, "/var/lib/juju/agents/unit-mysql-0/agent.socket");
    }

    #[test]
    fn test_missing_context_id() {
        let env = StaticEnvironment::new()
            .with_var(AGENT_SOCKET_VAR, "/tmp/agent.socket")
            .with_dir("/");
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let ctx = Context::new(&env, &mut out, &mut err);

        let e = build_request(&ctx, "juju-log", &[]).unwrap_err();
        assert!(matches!(e, ForwardError::NotSet(CONTEXT_ID_VAR)));
        assert_eq!(e.to_string(), "JUJU_CONTEXT_ID not set");
    }

    #[test]
    fn test_empty_socket_counts_as_unset() {
        let env = StaticEnvironment::new()
            .with_var(CONTEXT_ID_VAR, "ctx")
            .with_var(AGENT_SOCKET_VAR, "")
            .with_dir("/");
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let ctx = Context::new(&env, &mut out, &mut err);

        let e = build_request(&ctx, "juju-log", &[]).unwrap_err();
        assert_eq!(e.to_string(), "JUJU_AGENT_SOCKET not set");
    }

    #[test]
    fn test_working_dir_failure() {
        let env = StaticEnvironment::new()
            .with_var(CONTEXT_ID_VAR, "ctx")
            .with_var(AGENT_SOCKET_VAR, "/tmp/agent.socket");
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let ctx = Context::new(&env, &mut out, &mut err);

        let e = build_request(&ctx, "juju-log", &[]).unwrap_err();
        assert!(matches!(e, ForwardError::WorkingDir(_)));
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("gone.socket");
        let env = full_env().with_var(AGENT_SOCKET_VAR, socket.to_str().unwrap());
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let mut ctx = Context::new(&env, &mut out, &mut err);

        let e = run_hook_command(&mut ctx, "config-get", &[]).await.unwrap_err();
        assert!(matches!(e, ForwardError::Rpc(ref r) if r.is_connect()));
        assert!(out.is_empty());
        assert!(err.is_empty());
    }
}
