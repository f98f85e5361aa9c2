//! CLI module for k3cluster
//!
//! Thin `clap` surface over the library: every subcommand here parses
//! arguments and hands off to [`commands`], which does the actual work
//! against [`crate::config`], [`crate::orchestrator`] and
//! [`crate::discovery`]. Output formatting lives in [`display`] so the
//! command functions stay testable without a terminal.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "k3cluster")]
#[command(about = "Provision and manage multi-node k3s clusters on a local container runtime")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a config document without touching the runtime
    Validate(ValidateArgs),

    /// Create a cluster from a config document
    Create(CreateArgs),

    /// Delete a cluster and every object it owns
    Delete(DeleteArgs),

    /// List clusters known to the runtime
    List,

    /// Show detail for one cluster
    Get(GetArgs),

    /// Start every node in a stopped cluster
    Start(ClusterNameArgs),

    /// Stop every node in a running cluster
    Stop(StopArgs),

    /// Kubeconfig management
    Kubeconfig(KubeconfigArgs),

    /// Registry management
    Registry(RegistryArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to a Simple config document
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Path to a Simple config document
    pub file: PathBuf,

    /// Config field overrides, `key=value` (e.g. `servers=3`), applied at
    /// the highest merge precedence (§4.1: "explicit flags > primary file")
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Override the readiness timeout from `options.k3d.timeout`
    #[arg(long, value_parser = parse_timeout_flag)]
    pub timeout: Option<Duration>,

    /// Elevate pre-start hook failures to fatal instead of warn-and-continue
    #[arg(long)]
    pub strict_hooks: bool,

    /// Skip waiting for cluster readiness before returning
    #[arg(long)]
    pub no_wait: bool,

    /// Write the finished cluster's kubeconfig to this path instead of
    /// merging into the default `~/.kube/config`
    #[arg(long)]
    pub kubeconfig_output: Option<PathBuf>,
}

fn parse_timeout_flag(raw: &str) -> Result<Duration, String> {
    crate::config::transform::parse_duration(raw).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
pub struct DeleteArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct ClusterNameArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct StopArgs {
    pub name: String,

    /// Grace period before a node container is killed
    #[arg(long, default_value = "10", value_parser = parse_seconds)]
    pub timeout: Duration,
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("{raw:?} is not a whole number of seconds"))
}

#[derive(Parser, Debug)]
pub struct KubeconfigArgs {
    #[command(subcommand)]
    pub action: KubeconfigAction,
}

#[derive(Subcommand, Debug)]
pub enum KubeconfigAction {
    /// Print or merge a cluster's kubeconfig entry
    Write {
        name: String,
        /// Merge into this file instead of printing to stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Make this cluster's context current after merging
        #[arg(long)]
        switch_context: bool,
    },
}

#[derive(Parser, Debug)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub action: RegistryAction,
}

#[derive(Subcommand, Debug)]
pub enum RegistryAction {
    /// List every registry this host knows about, independent of cluster
    List,
    /// Delete a standalone registry (refuses if still referenced — pass
    /// `--force` to detach it from every cluster's network first)
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
    },
}
