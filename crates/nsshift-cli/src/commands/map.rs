//! `nsshift map` — Inspect the kernel and default id maps.

use std::path::PathBuf;

use clap::Args;

use nsshift_common::config::IdmapPaths;
use nsshift_core::resolver;

/// Arguments for the `map` command.
#[derive(Args, Debug)]
pub struct MapArgs {
    /// Rootfs whose shadow databases should be consulted.
    #[arg(long, default_value = "/")]
    pub rootfs: PathBuf,

    /// Resolve the map for this user instead of the calling user.
    #[arg(long)]
    pub user: Option<String>,
}

/// Executes the `map` command.
///
/// # Errors
///
/// Returns an error if the kernel map cannot be read or the default map
/// cannot be resolved.
pub fn execute(args: MapArgs) -> anyhow::Result<()> {
    let paths = IdmapPaths::under_rootfs(&args.rootfs);

    let kernel = resolver::current_with(&paths)?;
    println!("kernel uid/gid map:");
    for line in kernel.to_lxc_strings() {
        println!(" - {line}");
    }

    let default = resolver::default_idmap_with(&paths, args.user.as_deref())?;
    println!("default uid/gid map:");
    for entry in &default.idmap {
        let singleton = nsshift_core::set::IdmapSet {
            idmap: vec![*entry],
        };
        let suffix = if singleton.usable_with(&kernel).is_ok() {
            ""
        } else {
            " (unusable)"
        };
        println!(" - {}{suffix}", entry.to_lxc_string());
    }

    Ok(())
}
