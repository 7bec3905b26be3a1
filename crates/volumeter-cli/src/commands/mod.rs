//! CLI command definitions and dispatch.

pub mod query;
pub mod run;

use clap::{Parser, Subcommand};

/// Volumeter — per-port conntrack traffic accounting daemon.
#[derive(Parser, Debug)]
#[command(name = "volumeter", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the accounting daemon against a conntrack event stream.
    Run(run::RunArgs),
    /// Send one control command to a running daemon and print the reply.
    Query(query::QueryArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args).await,
        Command::Query(args) => query::execute(args).await,
    }
}
