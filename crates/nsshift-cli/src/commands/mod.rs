//! CLI command definitions and dispatch.

pub mod map;
pub mod shift;

use clap::{Parser, Subcommand};

/// nsshift — uid/gid translation toolkit for container filesystems.
#[derive(Parser, Debug)]
#[command(name = "nsshift", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite ownership of a directory tree under a set of id maps.
    Shift(shift::ShiftArgs),
    /// Print the kernel's current map and the resolved default map.
    Map(map::MapArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Shift(args) => shift::execute(args),
        Command::Map(args) => map::execute(args),
    }
}
