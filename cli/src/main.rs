/*!

This is the command line interface for provisioning smoke-test environments
and cleaning them up afterward.

!*/

mod cleanup;
mod deploy;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

/// The command line interface for running service-mesh smoke tests.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Prepare and clean up smoke-test environments on Kubernetes.
    #[clap(subcommand)]
    Kubernetes(KubernetesCommand),
}

#[derive(Debug, Parser)]
enum KubernetesCommand {
    /// Deploy the cluster that the smoke tests will be running on.
    Deploy(deploy::Deploy),
    /// Clean up the resources provisioned for an environment.
    Cleanup(cleanup::Cleanup),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let registry = smoke_clusters::default_registry();
    match args.command {
        Command::Kubernetes(KubernetesCommand::Deploy(deploy)) => deploy.run(&registry).await,
        Command::Kubernetes(KubernetesCommand::Cleanup(cleanup)) => cleanup.run(&registry).await,
    }
}

/// Extract the value of `RUST_LOG` if it exists, otherwise log both this
/// binary and the clusters library at the requested level.
fn init_logger(log_level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => Builder::from_default_env().init(),
        None => Builder::new()
            .filter(Some("mesh_smoke"), log_level)
            .filter(Some("smoke_clusters"), log_level)
            .init(),
    }
}
