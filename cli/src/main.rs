/*!

This is the command line interface of pharmer. It records clusters, node groups and credentials in
the configured store and applies them to GKE, EKS or DigitalOcean Kubernetes.

!*/

mod apply;
mod create;
mod delete;
mod edit;
mod get;
mod pharmer;
mod use_cluster;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use pharmer::Pharmer;
use std::path::PathBuf;

/// Provision and manage Kubernetes clusters on managed cloud offerings.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// Path to the pharmer configuration file. Defaults to `~/.pharmer/config.d/default`.
    #[clap(long = "config-file")]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Record a cluster, node group or credential.
    #[clap(subcommand)]
    Create(create::Create),
    /// List clusters, node groups or credentials.
    #[clap(subcommand)]
    Get(get::Get),
    /// Change the desired state of a node group.
    #[clap(subcommand)]
    Edit(edit::Edit),
    /// Request the deletion of a cluster, node group or credential.
    #[clap(subcommand)]
    Delete(delete::Delete),
    /// Bring a cluster in the cloud in line with its stored state.
    Apply(apply::Apply),
    /// Make a cluster the current kubectl context.
    #[clap(subcommand)]
    Use(use_cluster::Use),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let pharmer = Pharmer::open(args.config_file).await?;
    match args.command {
        Command::Create(create) => create.run(pharmer).await,
        Command::Get(get) => get.run(pharmer).await,
        Command::Edit(edit) => edit.run(pharmer).await,
        Command::Delete(delete) => delete.run(pharmer).await,
        Command::Apply(apply) => apply.run(pharmer).await,
        Command::Use(use_cluster) => use_cluster.run(pharmer).await,
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use the default log level for the pharmer crates only.
            let mut builder = Builder::new();
            for target in [
                env!("CARGO_CRATE_NAME"),
                "pharmer_cloud",
                "pharmer_model",
                "pharmer_providers",
                "pharmer_store",
            ] {
                builder.filter(Some(target), level);
            }
            builder.init();
        }
    }
}
