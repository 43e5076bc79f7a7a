//! jujud
//!
//! Resolves the invocation mode from argv[0], runs it and exits with its code.

use jujud::bootstrap::AgentCommand;
use jujud::context::{Context, OsEnvironment};
use jujud::router::{self, Mode, EXIT_FAILURE};
use stats_alloc::{StatsAlloc, INSTRUMENTED_SYSTEM};
use std::alloc::System;
use tokio::runtime::{Builder, Runtime};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: &StatsAlloc<System> = &INSTRUMENTED_SYSTEM;

/// Log filter override, e.g. `JUJUD_LOG=jujud=debug`
const LOG_ENV: &str = "JUJUD_LOG";

fn main() {
    let args = match router::collect_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };
    let agent = matches!(args.first().map(|a| Mode::from_arg0(a)), Some(Mode::Agent));

    init_tracing(agent);

    let runtime = match build_runtime(agent) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: starting runtime: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    let env = OsEnvironment;
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let mut ctx = Context::new(&env, &mut stdout, &mut stderr);
    let bootstrap = AgentCommand::new(&INSTRUMENTED_SYSTEM);

    let code = runtime.block_on(router::main(&args, &mut ctx, &bootstrap));
    std::process::exit(code);
}

/// Logs go to stderr; hook tools only report warnings unless asked.
fn init_tracing(agent: bool) {
    let default = if agent { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn build_runtime(agent: bool) -> std::io::Result<Runtime> {
    if !agent {
        return Builder::new_current_thread().enable_all().build();
    }
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    info!("setting worker threads = {}", workers);
    Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
}
