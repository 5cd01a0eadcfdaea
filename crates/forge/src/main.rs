// Path: crates/forge/src/main.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # CasperLabs Forge CLI
//!
//! Brings node / execution-engine container pairs up and down from the shell.

use anyhow::{anyhow, Context, Result};
use casperlabs_forge::testing::{DockerRuntime, PairedProcessManager, ProcessKind};
use casperlabs_types::config::{PairConfig, StartupStrategy};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(
    name = "forge",
    version,
    about = "CasperLabs node / execution-engine pair manager",
    long_about = "Forge creates, inspects and removes the Docker containers that make up a CasperLabs test node."
)]
struct ForgeCli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[clap(long, global = true, env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and start the pair for a node index.
    Up(UpArgs),
    /// Stop and remove the pair for a node index.
    Down(DownArgs),
    /// Print the logs of one process of a running pair.
    Logs(LogsArgs),
    /// Print the runtime status of both processes of a pair.
    Status(IndexArgs),
    /// Remove the shared network.
    Teardown,
}

#[derive(Parser, Debug)]
struct IndexArgs {
    /// Node index of the pair.
    #[clap(long, default_value = "0")]
    index: u32,
}

#[derive(Parser, Debug)]
struct UpArgs {
    #[clap(flatten)]
    target: IndexArgs,

    /// Delegate bring-up to the external build tool in this directory.
    #[clap(long)]
    via_tool: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DownArgs {
    #[clap(flatten)]
    target: IndexArgs,

    /// Also run the external tool's down target in this directory.
    #[clap(long)]
    via_tool: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProcessArg {
    Node,
    Engine,
}

impl From<ProcessArg> for ProcessKind {
    fn from(arg: ProcessArg) -> Self {
        match arg {
            ProcessArg::Node => ProcessKind::Node,
            ProcessArg::Engine => ProcessKind::Engine,
        }
    }
}

#[derive(Parser, Debug)]
struct LogsArgs {
    #[clap(flatten)]
    target: IndexArgs,

    #[clap(long, value_enum, default_value = "node")]
    process: ProcessArg,
}

fn load_config(path: Option<&PathBuf>) -> Result<PairConfig> {
    let mut config = match path {
        Some(path) => PairConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PairConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    casperlabs_telemetry::init::init_tracing().map_err(|e| anyhow!(e))?;
    let cli = ForgeCli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    if let Commands::Up(args) = &cli.command {
        if let Some(dir) = &args.via_tool {
            config.strategy = StartupStrategy::ExternalTool;
            config.external_tool.working_dir = Some(dir.clone());
        }
    }

    let runtime = DockerRuntime::connect().context("Failed to connect to the Docker daemon")?;
    let manager = PairedProcessManager::new(Arc::new(runtime), config)?;

    match cli.command {
        Commands::Up(args) => {
            let pair = manager.up(args.target.index).await?;
            println!("{} is up on network '{}'", pair, pair.network().name);
            if let Some(key) = pair.credentials().public_key() {
                println!("validator public key: {}", key);
            }
        }
        Commands::Down(args) => {
            let mut pair = manager
                .attach_remains(args.target.index, args.via_tool.as_deref())
                .await?;
            manager.shutdown(&mut pair).await;
            println!("{} is down", pair);
        }
        Commands::Logs(args) => {
            let pair = manager.attach(args.target.index, None).await?;
            match manager.logs(&pair, args.process.into()).await? {
                Some(text) => print!("{}", text),
                None => println!("no {:?} process for {}", args.process, pair),
            }
        }
        Commands::Status(args) => {
            let pair = manager.attach(args.index, None).await;
            let pair = match pair {
                Ok(pair) => pair,
                Err(e) => {
                    println!("node-{}: {}", args.index, e);
                    return Ok(());
                }
            };
            for kind in [ProcessKind::Node, ProcessKind::Engine] {
                let status = manager.status(&pair, kind).await?;
                println!("{} {}: {}", pair, kind, status);
            }
        }
        Commands::Teardown => {
            if manager.teardown_network().await? {
                println!("removed network '{}'", manager.config().network_name);
            } else {
                println!("network '{}' not removed", manager.config().network_name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_accepts_index_and_tool_directory() {
        let cli = ForgeCli::try_parse_from(["forge", "up", "--index", "3", "--via-tool", "/tmp/nodes"])
            .unwrap();
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.target.index, 3);
                assert_eq!(args.via_tool, Some(PathBuf::from("/tmp/nodes")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn status_defaults_to_node_zero() {
        let cli = ForgeCli::try_parse_from(["forge", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status(IndexArgs { index: 0 })));
    }

    #[test]
    fn logs_selects_the_engine_process() {
        let cli = ForgeCli::try_parse_from([
            "forge", "--config", "pair.toml", "logs", "--index", "1", "--process", "engine",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pair.toml")));
        match cli.command {
            Commands::Logs(args) => {
                assert_eq!(args.target.index, 1);
                assert!(matches!(ProcessKind::from(args.process), ProcessKind::Engine));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn down_and_teardown_parse() {
        let cli = ForgeCli::try_parse_from(["forge", "down", "--index", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Down(DownArgs { target: IndexArgs { index: 2 }, via_tool: None })
        ));
        let cli = ForgeCli::try_parse_from(["forge", "teardown"]).unwrap();
        assert!(matches!(cli.command, Commands::Teardown));
    }

    #[test]
    fn unknown_process_is_rejected() {
        assert!(ForgeCli::try_parse_from(["forge", "logs", "--process", "wallet"]).is_err());
    }
}
