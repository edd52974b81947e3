//! # nsshift — uid/gid shifting CLI
//!
//! Diagnostic frontend for the mapping core: shift a filesystem tree
//! between host and container ids, and inspect the maps a host resolves.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
