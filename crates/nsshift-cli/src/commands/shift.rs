//! `nsshift shift` — Rewrite ownership of a directory tree.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use nsshift_core::entry::IdmapEntry;
use nsshift_core::set::IdmapSet;
use nsshift_core::shift::ShiftDirection;

/// Arguments for the `shift` command.
#[derive(Args, Debug)]
pub struct ShiftArgs {
    /// Directory tree to rewrite.
    pub directory: PathBuf,

    /// Map descriptors of the form `<u|g|b>:<nsid>:<hostid>:<maprange>`.
    #[arg(required = true)]
    pub maps: Vec<String>,

    /// Log the planned changes without touching the tree.
    #[arg(short, long)]
    pub test: bool,

    /// Shift out of the container namespace instead of into it.
    #[arg(short, long)]
    pub reverse: bool,
}

/// Executes the `shift` command.
///
/// # Errors
///
/// Returns an error if a descriptor is malformed or the tree rewrite fails.
pub fn execute(args: ShiftArgs) -> anyhow::Result<()> {
    let mut set = IdmapSet::new();
    for descriptor in &args.maps {
        let entry: IdmapEntry = descriptor
            .parse()
            .with_context(|| format!("bad map descriptor {descriptor:?}"))?;
        set.add(entry)
            .with_context(|| format!("conflicting map descriptor {descriptor:?}"))?;
    }

    let direction = if args.reverse {
        ShiftDirection::Out
    } else {
        ShiftDirection::In
    };

    tracing::info!(
        directory = %args.directory.display(),
        entries = set.len(),
        reverse = args.reverse,
        "shifting tree"
    );
    set.shift_tree(&args.directory, direction, args.test, None)
        .with_context(|| format!("failed shifting {}", args.directory.display()))?;

    Ok(())
}
