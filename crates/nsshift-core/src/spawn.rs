//! Projection of a map set into the flat tables the kernel consumes when a
//! user namespace is created for a child process.

use std::fs;
use std::path::Path;

use nsshift_common::error::{Result, ShiftError};

use crate::set::IdmapSet;

/// One `(container, host, size)` row of a kernel map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnMapping {
    /// Container-side start of the range.
    pub container_id: u32,
    /// Host-side start of the range.
    pub host_id: u32,
    /// Number of ids covered.
    pub size: u32,
}

impl IdmapSet {
    /// Uid rows in entry order, unmerged; the kernel applies the list as
    /// given.
    #[must_use]
    pub fn uid_mappings(&self) -> Vec<SpawnMapping> {
        self.uid_entries().map(to_mapping).collect()
    }

    /// Gid rows in entry order, unmerged.
    #[must_use]
    pub fn gid_mappings(&self) -> Vec<SpawnMapping> {
        self.gid_entries().map(to_mapping).collect()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_mapping(entry: &crate::entry::IdmapEntry) -> SpawnMapping {
    SpawnMapping {
        container_id: entry.nsid as u32,
        host_id: entry.hostid as u32,
        size: entry.maprange as u32,
    }
}

/// Renders rows in the `/proc/<pid>/{uid,gid}_map` file format.
#[must_use]
pub fn render_proc_file(mappings: &[SpawnMapping]) -> String {
    let mut contents = String::new();
    for mapping in mappings {
        contents.push_str(&format!(
            "{} {} {}\n",
            mapping.container_id, mapping.host_id, mapping.size
        ));
    }
    contents
}

/// Writes the uid/gid tables of `set` to a child's kernel map files.
///
/// `setgroups` must be denied before an unprivileged process may write a
/// gid map, so that is done first. A `pid` of `0` addresses the calling
/// process.
///
/// # Errors
///
/// Returns an error if any of the proc files cannot be written.
pub fn apply_to_process(pid: u32, set: &IdmapSet) -> Result<()> {
    let pid_str = if pid == 0 {
        "self".to_string()
    } else {
        pid.to_string()
    };

    let setgroups = format!("/proc/{pid_str}/setgroups");
    if Path::new(&setgroups).exists() {
        fs::write(&setgroups, "deny").map_err(|e| ShiftError::io(&setgroups, e))?;
    }

    let uid_map = format!("/proc/{pid_str}/uid_map");
    fs::write(&uid_map, render_proc_file(&set.uid_mappings()))
        .map_err(|e| ShiftError::io(&uid_map, e))?;

    let gid_map = format!("/proc/{pid_str}/gid_map");
    fs::write(&gid_map, render_proc_file(&set.gid_mappings()))
        .map_err(|e| ShiftError::io(&gid_map, e))?;

    tracing::debug!(pid, entries = set.len(), "wrote uid/gid maps");
    Ok(())
}
