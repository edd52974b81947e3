//! Decision procedure for the default id map of a user.
//!
//! Combines three sources of truth: the shadow subordinate-id databases,
//! the kernel's current namespace map, and a hard-coded fallback for hosts
//! where neither yields anything workable.

use std::path::Path;

use nsshift_common::config::IdmapPaths;
use nsshift_common::constants::{
    FALLBACK_HOST_ID, FALLBACK_MAP_RANGE, FULL_RANGE_END, MIN_DELEGATED_SPAN, SYSTEM_ID_CEILING,
};
use nsshift_common::error::{Result, ShiftError};

use crate::entry::IdmapEntry;
use crate::range::{Axis, IdRange};
use crate::set::IdmapSet;
use crate::{procmap, shadow};

/// Resolves the default map for `username` against the shadow databases
/// under `rootfs`, falling back to the kernel map when shadow has nothing.
///
/// `None` substitutes the calling user. The result is not validated;
/// callers decide when to run [`IdmapSet::usable`].
///
/// # Errors
///
/// Returns an error if the user cannot be resolved, a database fails to
/// parse, or a non-root user has no shadow record.
pub fn default_idmap(rootfs: &Path, username: Option<&str>) -> Result<IdmapSet> {
    default_idmap_with(&IdmapPaths::under_rootfs(rootfs), username)
}

/// [`default_idmap`] against explicit database locations.
///
/// # Errors
///
/// Same conditions as [`default_idmap`].
pub fn default_idmap_with(paths: &IdmapPaths, username: Option<&str>) -> Result<IdmapSet> {
    let username = match username {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => calling_username()?,
    };

    // Shadow's tools are only considered installed when both databases exist.
    if !paths.subuid.exists() || !paths.subgid.exists() {
        return kernel_default_map(paths);
    }

    let mut set = IdmapSet::new();
    for (path, axis) in [(&paths.subuid, Axis::Uid), (&paths.subgid, Axis::Gid)] {
        let records = match shadow::read_subordinate_ranges(path, &username) {
            Ok(records) => records,
            Err(ShiftError::NoUserMap { .. }) if username == "root" => {
                // No root delegation; derive a default from the kernel map.
                return kernel_default_map(paths);
            }
            Err(err) => return Err(err),
        };

        for record in records {
            set.push(IdmapEntry {
                is_uid: axis == Axis::Uid,
                is_gid: axis == Axis::Gid,
                nsid: 0,
                hostid: i64::from(record.host_start),
                maprange: i64::from(record.size),
            });
        }
    }

    Ok(set)
}

/// Snapshot of the calling process's namespace map.
///
/// # Errors
///
/// Returns an error if a map file exists but cannot be parsed or yields no
/// records.
pub fn current() -> Result<IdmapSet> {
    current_with(&IdmapPaths::default())
}

/// [`current`] against explicit map locations.
///
/// # Errors
///
/// Same conditions as [`current`].
pub fn current_with(paths: &IdmapPaths) -> Result<IdmapSet> {
    let mut set = IdmapSet::new();

    for (path, axis) in [
        (&paths.proc_uid_map, Axis::Uid),
        (&paths.proc_gid_map, Axis::Gid),
    ] {
        if path.exists() {
            for line in procmap::read_proc_map(path)? {
                set.push(IdmapEntry {
                    is_uid: axis == Axis::Uid,
                    is_gid: axis == Axis::Gid,
                    nsid: i64::from(line.nsid_start),
                    hostid: i64::from(line.host_start),
                    maprange: i64::from(line.size),
                });
            }
        } else {
            // Kernels without user namespaces expose no map at all.
            set.push(IdmapEntry {
                is_uid: axis == Axis::Uid,
                is_gid: axis == Axis::Gid,
                nsid: 0,
                hostid: 0,
                maprange: 0,
            });
        }
    }

    Ok(set)
}

/// Resolves, logs, and validates the default map for the calling user.
///
/// Returns `None` (after warning) when no usable map exists; the caller is
/// expected to restrict itself to privileged containers in that case.
#[must_use]
pub fn get_default() -> Option<IdmapSet> {
    get_default_with(&IdmapPaths::default())
}

/// [`get_default`] against explicit database locations.
#[must_use]
pub fn get_default_with(paths: &IdmapPaths) -> Option<IdmapSet> {
    let set = match default_idmap_with(paths, None) {
        Ok(set) => set,
        Err(err) => {
            tracing::warn!(error = %err, "error reading default uid/gid map");
            tracing::warn!("only privileged containers will be able to run");
            return None;
        }
    };

    let kernel = current_with(paths);
    if let Ok(kernel) = &kernel {
        tracing::info!("kernel uid/gid map:");
        for line in kernel.to_lxc_strings() {
            tracing::info!(map = %line, "kernel map entry");
        }
    }

    if set.is_empty() {
        tracing::warn!("no available uid/gid map could be found");
        tracing::warn!("only privileged containers will be able to run");
        return None;
    }

    tracing::info!("configured uid/gid map:");
    for entry in &set.idmap {
        let singleton = IdmapSet {
            idmap: vec![*entry],
        };
        let usable = kernel
            .as_ref()
            .is_ok_and(|k| singleton.usable_with(k).is_ok());
        let suffix = if usable { "" } else { " (unusable)" };
        let line = format!("{}{suffix}", entry.to_lxc_string());
        tracing::info!(map = %line, "configured map entry");
    }

    if let Err(err) = kernel.and_then(|k| set.usable_with(&k)) {
        tracing::warn!(
            error = %err,
            "one or more uid/gid map entries aren't usable (typically due to nesting)"
        );
        tracing::warn!("only privileged containers will be able to run");
        return None;
    }

    Some(set)
}

fn kernel_default_map(paths: &IdmapPaths) -> Result<IdmapSet> {
    let Ok(kernel) = current_with(paths) else {
        return Ok(fallback_map());
    };

    let ranges = kernel.valid_ranges();
    if ranges == full_kernel_ranges() {
        // The host runs in the initial namespace with nothing delegated;
        // carve the historical block out of the unused high ids.
        return Ok(fallback_map());
    }

    let mut set = IdmapSet::new();
    for axis in [Axis::Uid, Axis::Gid] {
        // TODO: use every qualifying range once multiple shadow maps can be
        // expressed downstream; today only the first one is kept.
        for range in ranges.iter().filter(|r| r.axis == axis) {
            // Stay clear of the system's own POSIX allocation.
            if range.end_id < SYSTEM_ID_CEILING {
                continue;
            }

            let start_id = range.start_id.max(SYSTEM_ID_CEILING);
            if range.end_id - start_id < MIN_DELEGATED_SPAN {
                continue;
            }

            set.push(IdmapEntry {
                is_uid: axis == Axis::Uid,
                is_gid: axis == Axis::Gid,
                nsid: 0,
                hostid: i64::from(start_id),
                maprange: i64::from(range.end_id - start_id) + 1,
            });
            break;
        }
    }

    Ok(set)
}

fn fallback_map() -> IdmapSet {
    let mut set = IdmapSet::new();
    for axis in [Axis::Uid, Axis::Gid] {
        set.push(IdmapEntry {
            is_uid: axis == Axis::Uid,
            is_gid: axis == Axis::Gid,
            nsid: 0,
            hostid: FALLBACK_HOST_ID,
            maprange: FALLBACK_MAP_RANGE,
        });
    }
    set
}

fn full_kernel_ranges() -> Vec<IdRange> {
    vec![
        IdRange::new(Axis::Uid, 0, FULL_RANGE_END),
        IdRange::new(Axis::Gid, 0, FULL_RANGE_END),
    ]
}

fn calling_username() -> Result<String> {
    let uid = nix::unistd::getuid();
    let user = nix::unistd::User::from_uid(uid)
        .map_err(|err| ShiftError::UnknownUser {
            name: format!("uid {uid} ({err})"),
        })?
        .ok_or_else(|| ShiftError::UnknownUser {
            name: format!("uid {uid}"),
        })?;
    Ok(user.name)
}
