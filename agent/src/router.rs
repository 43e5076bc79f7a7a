//! Invocation routing
//!
//! One executable plays several roles. The role is chosen once, from the base
//! name the process was started as:
//!
//! - `jujud`: the agent itself; control passes to the bootstrap command tree.
//! - `jujuc`: the hook tool dispatcher, which must only be reached through a
//!   per-command symlink; direct use is refused.
//! - anything else: a hook tool; the command is forwarded to the running agent.

use crate::context::Context;
use crate::forwarder;
use jujud_shared::types::command::ExitCode;
use jujud_shared::utils::base_name;
use std::ffi::OsString;
use tracing::debug;

/// Name the agent executable is installed as
pub const AGENT_NAME: &str = "jujud";

/// Reserved name of the hook tool dispatcher
pub const HOOK_RUNNER_NAME: &str = "jujuc";

/// Exit code for any failure before or during forwarding
pub const EXIT_FAILURE: ExitCode = 1;

/// Exit code for direct invocation of the hook tool dispatcher
pub const EXIT_MISUSE: ExitCode = 2;

pub const JUJUD_DOC: &str = "
juju provides easy, intelligent service orchestration on top of environments
such as OpenStack, Amazon AWS, or bare metal. jujud is a component of juju.

https://juju.ubuntu.com/

The jujud command can also forward invocations over RPC for execution by the
juju unit agent. When used in this way, it expects to be called via a symlink
named for the desired remote command, and expects JUJU_AGENT_SOCKET and
JUJU_CONTEXT_ID be set in its environment.
";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("jujuc should not be called directly")]
    DirectInvocation,

    #[error("empty argument list: cannot determine program name")]
    NoProgramName,

    #[error("argument {0:?} is not valid unicode")]
    NonUnicodeArg(OsString),
}

/// Collect the process arguments, refusing any that are not valid unicode.
///
/// Hook tool arguments are forwarded to the agent as-is, so they are never
/// rewritten lossily.
pub fn collect_args(args: impl IntoIterator<Item = OsString>) -> Result<Vec<String>, RouterError> {
    args.into_iter()
        .map(|a| a.into_string().map_err(RouterError::NonUnicodeArg))
        .collect()
}

/// The role this process plays, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Agent,
    DirectHookRunner,
    HookTool(String),
}

impl Mode {
    pub fn from_arg0(arg0: &str) -> Self {
        match base_name(arg0) {
            AGENT_NAME => Mode::Agent,
            HOOK_RUNNER_NAME => Mode::DirectHookRunner,
            name => Mode::HookTool(name.to_string()),
        }
    }
}

/// The agent command tree that runs when the process is invoked as `jujud`.
///
/// Receives the full argument vector, argv[0] included.
#[allow(async_fn_in_trait)]
pub trait Bootstrap {
    async fn run(&self, ctx: &mut Context<'_>, args: &[String]) -> anyhow::Result<ExitCode>;
}

/// Resolve the mode for `args` and run it, returning the exit code and any
/// error to report.
pub async fn dispatch<B: Bootstrap>(
    args: &[String],
    ctx: &mut Context<'_>,
    bootstrap: &B,
) -> (ExitCode, Option<anyhow::Error>) {
    let Some(arg0) = args.first() else {
        return (EXIT_FAILURE, Some(RouterError::NoProgramName.into()));
    };

    let mode = Mode::from_arg0(arg0);
    debug!("invoked as {:?}", mode);
    match mode {
        Mode::Agent => match bootstrap.run(ctx, args).await {
            Ok(code) => (code, None),
            Err(e) => (EXIT_FAILURE, Some(e)),
        },
        Mode::DirectHookRunner => {
            // Best effort: the exit code carries the outcome either way.
            let _ = ctx.stderr.write_all(JUJUD_DOC.as_bytes());
            (EXIT_MISUSE, Some(RouterError::DirectInvocation.into()))
        }
        Mode::HookTool(name) => match forwarder::run_hook_command(ctx, &name, &args[1..]).await {
            Ok(code) => (code, None),
            Err(e) => (EXIT_FAILURE, Some(e.into())),
        },
    }
}

/// Run the invocation and report any error as `error: <err>` on stderr.
///
/// The returned code is the process exit status.
pub async fn main<B: Bootstrap>(args: &[String], ctx: &mut Context<'_>, bootstrap: &B) -> ExitCode {
    let (code, err) = dispatch(args, ctx, bootstrap).await;
    if let Some(err) = err {
        let _ = writeln!(ctx.stderr, "error: {:#}", err);
        let _ = ctx.stderr.flush();
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticEnvironment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBootstrap {
        calls: AtomicUsize,
    }

    impl Bootstrap for CountingBootstrap {
        async fn run(&self, ctx: &mut Context<'_>, args: &[String]) -> anyhow::Result<ExitCode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            writeln!(ctx.stdout, "bootstrap {}", args[1..].join(" "))?;
            Ok(0)
        }
    }

    fn argv(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_from_arg0() {
        assert_eq!(Mode::from_arg0("/var/lib/juju/tools/jujud"), Mode::Agent);
        assert_eq!(Mode::from_arg0("jujuc"), Mode::DirectHookRunner);
        assert_eq!(
            Mode::from_arg0("/var/lib/juju/tools/unit-mysql-0/relation-get"),
            Mode::HookTool("relation-get".to_string())
        );
        // Only the base name matters
        assert_eq!(
            Mode::from_arg0("/opt/jujud/config-get"),
            Mode::HookTool("config-get".to_string())
        );
    }

    #[tokio::test]
    async fn test_agent_mode_delegates_to_bootstrap() {
        let env = StaticEnvironment::new();
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let mut ctx = Context::new(&env, &mut out, &mut err);
        let bootstrap = CountingBootstrap::default();

        let code = main(&argv(&["/usr/bin/jujud", "version"]), &mut ctx, &bootstrap).await;
        assert_eq!(code, 0);
        assert_eq!(bootstrap.calls.load(Ordering::SeqCst), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "bootstrap version\n");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_direct_hook_runner_refused() {
        let env = StaticEnvironment::new()
            .with_var(forwarder::CONTEXT_ID_VAR, "ctx")
            .with_var(forwarder::AGENT_SOCKET_VAR, "/nonexistent/agent.socket")
            .with_dir("/");
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let mut ctx = Context::new(&env, &mut out, &mut err);
        let bootstrap = CountingBootstrap::default();

        let code = main(&argv(&["jujuc", "relation-get", "-"]), &mut ctx, &bootstrap).await;
        assert_eq!(code, EXIT_MISUSE);
        assert_eq!(bootstrap.calls.load(Ordering::SeqCst), 0);

        let err = String::from_utf8(err).unwrap();
        assert!(err.starts_with(JUJUD_DOC));
        assert!(err.ends_with("error: jujuc should not be called directly\n"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_hook_tool_without_context_fails() {
        let env = StaticEnvironment::new().with_dir("/");
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let mut ctx = Context::new(&env, &mut out, &mut err);
        let bootstrap = CountingBootstrap::default();

        let code = main(&argv(&["/tools/juju-log", "hello"]), &mut ctx, &bootstrap).await;
        assert_eq!(code, EXIT_FAILURE);
        assert_eq!(String::from_utf8(err).unwrap(), "error: JUJU_CONTEXT_ID not set\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_collect_args() {
        use std::os::unix::ffi::OsStringExt;

        let args = collect_args(["relation-get", "-r", "db:2"].map(OsString::from)).unwrap();
        assert_eq!(args, argv(&["relation-get", "-r", "db:2"]));

        let bad = OsString::from_vec(b"caf\xe9".to_vec());
        let e = collect_args(vec![OsString::from("juju-log"), bad.clone()]).unwrap_err();
        assert!(matches!(e, RouterError::NonUnicodeArg(ref a) if *a == bad));
        assert!(e.to_string().starts_with("argument"));
    }

    #[tokio::test]
    async fn test_empty_args() {
        let env = StaticEnvironment::new();
        let (mut out, mut err) = (Vec::<u8>::new(), Vec::<u8>::new());
        let mut ctx = Context::new(&env, &mut out, &mut err);

        let (code, e) = dispatch(&[], &mut ctx, &CountingBootstrap::default()).await;
        assert_eq!(code, EXIT_FAILURE);
        assert!(e.is_some());
    }
}
