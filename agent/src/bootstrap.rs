//! The `jujud` command tree
//!
//! Runs when the executable is invoked under its own name. Agent workers are
//! provided elsewhere; these commands set up the process around them (agent
//! tag, optional profiling) and hold it until interrupted.

use crate::config::ProfilingConfig;
use crate::context::Context;
use crate::profiling::{Profiler, ProfilingSession, EXIT_ON_SIGNAL};
use crate::router::{Bootstrap, JUJUD_DOC};
use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use jujud_shared::types::command::ExitCode;
use stats_alloc::StatsAlloc;
use std::alloc::System;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jujud")]
#[command(about = "juju agent", long_about = JUJUD_DOC)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a machine agent
    Machine(MachineArgs),

    /// Run a unit agent
    Unit(UnitArgs),

    /// Print the current version
    Version,
}

#[derive(Args, Debug)]
struct MachineArgs {
    /// Id of the machine to run (e.g. "0", "0/lxc/1")
    #[arg(long)]
    machine_id: String,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Args, Debug)]
struct UnitArgs {
    /// Name of the unit to run (e.g. "mysql/0")
    #[arg(long)]
    unit_name: String,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// Record CPU and heap profiles while the agent runs
    #[arg(long)]
    profile: bool,
}

/// Agent tag for a machine id: `0/lxc/1` becomes `machine-0-lxc-1`
pub fn machine_tag(id: &str) -> Result<String> {
    let valid = !id.is_empty()
        && id
            .split('/')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
    if !valid {
        anyhow::bail!("invalid machine id {:?}", id);
    }
    Ok(format!("machine-{}", id.replace('/', "-")))
}

/// Agent tag for a unit name: `mysql/0` becomes `unit-mysql-0`
pub fn unit_tag(name: &str) -> Result<String> {
    let valid = match name.split_once('/') {
        Some((service, number)) => {
            !service.is_empty()
                && service
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    };
    if !valid {
        anyhow::bail!("invalid unit name {:?}", name);
    }
    Ok(format!("unit-{}", name.replace('/', "-")))
}

/// The agent command tree, with profiling backed by the process allocator
pub struct AgentCommand {
    alloc: &'static StatsAlloc<System>,
}

impl AgentCommand {
    pub fn new(alloc: &'static StatsAlloc<System>) -> Self {
        Self { alloc }
    }

    async fn run_agent(&self, ctx: &Context<'_>, tag: &str, args: AgentArgs) -> Result<ExitCode> {
        let session = if args.profile {
            let config = ProfilingConfig::from_env(ctx.env).context("profiling configuration")?;
            Profiler::new(config, self.alloc).enable(tag)
        } else {
            ProfilingSession::disabled()
        };

        info!("agent {} running", tag);
        if session.is_active() {
            // The profiler owns SIGINT while recording; its dump ends the process.
            session.terminated().await;
            return Ok(EXIT_ON_SIGNAL);
        }

        tokio::signal::ctrl_c()
            .await
            .context("waiting for interrupt")?;
        info!("agent {} shutting down", tag);
        Ok(0)
    }
}

impl Bootstrap for AgentCommand {
    async fn run(&self, ctx: &mut Context<'_>, args: &[String]) -> Result<ExitCode> {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) => {
                let out = if e.use_stderr() { &mut *ctx.stderr } else { &mut *ctx.stdout };
                write!(out, "{}", e.render())?;
                return Ok(e.exit_code());
            }
        };

        match cli.command {
            Commands::Version => {
                writeln!(ctx.stdout, "{}", env!("CARGO_PKG_VERSION"))?;
                Ok(0)
            }
            Commands::Machine(args) => {
                let tag = machine_tag(&args.machine_id)?;
                self.run_agent(ctx, &tag, args.agent).await
            }
            Commands::Unit(args) => {
                let tag = unit_tag(&args.unit_name)?;
                self.run_agent(ctx, &tag, args.agent).await
            }
        }
    }
}
