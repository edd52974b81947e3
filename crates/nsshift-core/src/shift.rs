//! Filesystem tree shifting: ownership, POSIX ACLs, file capabilities.
//!
//! The traversal is depth-first pre-order so directory ownership is updated
//! before the entries underneath. Symlinks are never followed; their own
//! ownership is rewritten through the link-aware syscalls.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::{lchown, MetadataExt};
use std::path::{Path, PathBuf};

use nsshift_common::error::{Result, ShiftError};

use crate::range::Axis;
use crate::set::IdmapSet;
use crate::{acl, caps};

/// Which way ownership is being rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    /// Host ids become container ids (container start).
    In,
    /// Container ids become host ids (container teardown).
    Out,
}

/// Skip predicate handed to the shifter: `(root, abs_path, link_metadata)`.
/// Returning `true` skips a file, or a directory together with its subtree.
pub type SkipPredicate<'a> = dyn Fn(&Path, &Path, &fs::Metadata) -> bool + 'a;

impl IdmapSet {
    /// Shifts a root filesystem into the container namespace.
    ///
    /// # Errors
    ///
    /// Returns the first traversal failure with its path context.
    pub fn shift_rootfs(&self, path: &Path, skipper: Option<&SkipPredicate<'_>>) -> Result<()> {
        self.shift_tree(path, ShiftDirection::In, false, skipper)
    }

    /// Shifts a root filesystem back out of the container namespace.
    ///
    /// # Errors
    ///
    /// Returns the first traversal failure with its path context.
    pub fn unshift_rootfs(&self, path: &Path, skipper: Option<&SkipPredicate<'_>>) -> Result<()> {
        self.shift_tree(path, ShiftDirection::Out, false, skipper)
    }

    /// Shifts a single file into the container namespace.
    ///
    /// # Errors
    ///
    /// Returns the first failure with its path context.
    pub fn shift_file(&self, path: &Path) -> Result<()> {
        self.shift_rootfs(path, None)
    }

    /// Rewrites ownership, ACLs, and capabilities under `path` so the tree
    /// is consistent with this map in the given direction. Test mode logs
    /// the planned changes without touching the tree.
    ///
    /// The shifter must be the only writer to the subtree for the duration
    /// of the call; a partially failed shift is not rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first traversal failure with its path context. A failed
    /// capability re-application alone is logged and not propagated.
    pub fn shift_tree(
        &self,
        path: &Path,
        direction: ShiftDirection,
        testmode: bool,
        skipper: Option<&SkipPredicate<'_>>,
    ) -> Result<()> {
        if direction == ShiftDirection::In {
            // Settle the capability support probe before any file is
            // touched; the answer is cached process-wide.
            caps::supports_vfs3_fscaps(path);
        }

        let root = resolve_parent_symlinks(path)?;

        let mut hard_links: HashSet<u64> = HashSet::new();
        walk(&root, &root, skipper, &mut hard_links, &mut |path, meta| {
            self.shift_entry(path, meta, direction, testmode)
        })
    }

    fn shift_entry(
        &self,
        path: &Path,
        meta: &fs::Metadata,
        direction: ShiftDirection,
        testmode: bool,
    ) -> Result<()> {
        let uid = i64::from(meta.uid());
        let gid = i64::from(meta.gid());
        let (new_uid, new_gid) = match direction {
            ShiftDirection::In => self.shift_into_ns(uid, gid),
            ShiftDirection::Out => self.shift_from_ns(uid, gid),
        };

        if testmode {
            tracing::info!(
                path = %path.display(),
                new_uid,
                new_gid,
                "would shift"
            );
            return Ok(());
        }

        let is_symlink = meta.file_type().is_symlink();

        // chown wipes setuid bits and capabilities; read the blob first so
        // it can be restored afterwards.
        let file_caps = if is_symlink {
            None
        } else {
            caps::get_caps(path).map_err(|e| ShiftError::io(path, e))?
        };

        // An untranslatable axis comes back as -1, which the chown ABI
        // already treats as "leave unchanged".
        lchown(
            path,
            u32::try_from(new_uid).ok(),
            u32::try_from(new_gid).ok(),
        )
        .map_err(|e| ShiftError::io(path, e))?;

        if is_symlink {
            return Ok(());
        }

        let translate = |id: i64, axis: Axis| -> i64 {
            let (u, g) = match direction {
                ShiftDirection::In => self.shift_into_ns(id, id),
                ShiftDirection::Out => self.shift_from_ns(id, id),
            };
            match axis {
                Axis::Uid => u,
                Axis::Gid => g,
            }
        };
        acl::shift_acl_ids(path, &translate).map_err(|e| ShiftError::io(path, e))?;

        if let Some(blob) = file_caps {
            let root_uid = match direction {
                ShiftDirection::In => self.shift_into_ns(0, 0).0,
                ShiftDirection::Out => 0,
            };

            if direction == ShiftDirection::Out || caps::vfs3_fscaps_cached() {
                if let Err(err) = caps::set_caps(path, &blob, root_uid) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "unable to set file capabilities"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Resolves symlinks in everything but the final path component, so the
/// target itself is never dereferenced, and drops any trailing separator.
fn resolve_parent_symlinks(path: &Path) -> Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            let parent = parent
                .canonicalize()
                .map_err(|e| ShiftError::io(parent, e))?;
            Ok(parent.join(name))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Pre-order traversal with hard-link de-duplication. Children are visited
/// in name order; an inode already seen through another link with link
/// count ≥ 2 is not visited again.
fn walk(
    root: &Path,
    path: &Path,
    skipper: Option<&SkipPredicate<'_>>,
    hard_links: &mut HashSet<u64>,
    visit: &mut dyn FnMut(&Path, &fs::Metadata) -> Result<()>,
) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| ShiftError::io(path, e))?;

    if let Some(skip) = skipper {
        if skip(root, path, &meta) {
            return Ok(());
        }
    }

    if meta.nlink() >= 2 && !hard_links.insert(meta.ino()) {
        // Already shifted through another hard link.
        return Ok(());
    }

    visit(path, &meta)?;

    if meta.is_dir() {
        let entries = fs::read_dir(path).map_err(|e| ShiftError::io(path, e))?;
        let mut children: Vec<PathBuf> = Vec::new();
        for entry in entries {
            children.push(entry.map_err(|e| ShiftError::io(path, e))?.path());
        }
        children.sort();

        for child in children {
            walk(root, &child, skipper, hard_links, visit)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"x").expect("write file");
    }

    fn collect_visits(
        root: &Path,
        skipper: Option<&SkipPredicate<'_>>,
    ) -> Vec<PathBuf> {
        let mut seen = Vec::new();
        let mut hard_links = HashSet::new();
        walk(root, root, skipper, &mut hard_links, &mut |path, _| {
            seen.push(path.to_path_buf());
            Ok(())
        })
        .expect("walk");
        seen
    }

    #[test]
    fn walk_is_preorder_with_sorted_children() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir(root.join("sub")).expect("mkdir");
        touch(&root.join("sub/inner"));
        touch(&root.join("a"));
        touch(&root.join("z"));

        let seen = collect_visits(root, None);
        assert_eq!(
            seen,
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("sub"),
                root.join("sub/inner"),
                root.join("z"),
            ]
        );
    }

    #[test]
    fn hard_linked_inode_is_visited_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("file"));
        fs::hard_link(root.join("file"), root.join("link")).expect("hard link");
        touch(&root.join("other"));

        let seen = collect_visits(root, None);
        assert_eq!(
            seen,
            vec![root.to_path_buf(), root.join("file"), root.join("other")]
        );
    }

    #[test]
    fn skipped_directory_subtree_is_never_visited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir(root.join("keep")).expect("mkdir");
        touch(&root.join("keep/file"));
        fs::create_dir(root.join("skip")).expect("mkdir");
        touch(&root.join("skip/file"));

        let skipper = |_: &Path, path: &Path, _: &fs::Metadata| path.ends_with("skip");
        let seen = collect_visits(root, Some(&skipper));
        assert_eq!(
            seen,
            vec![root.to_path_buf(), root.join("keep"), root.join("keep/file")]
        );
    }

    #[test]
    fn skipped_file_does_not_stop_its_siblings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("a"));
        touch(&root.join("b"));
        touch(&root.join("c"));

        let skipper = |_: &Path, path: &Path, _: &fs::Metadata| path.ends_with("b");
        let seen = collect_visits(root, Some(&skipper));
        assert_eq!(
            seen,
            vec![root.to_path_buf(), root.join("a"), root.join("c")]
        );
    }

    #[test]
    fn resolve_parent_symlinks_keeps_the_final_component() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real_parent = dir.path().join("real");
        fs::create_dir(&real_parent).expect("mkdir");
        touch(&real_parent.join("leaf"));
        std::os::unix::fs::symlink(&real_parent, dir.path().join("alias")).expect("symlink");

        let resolved =
            resolve_parent_symlinks(&dir.path().join("alias/leaf")).expect("resolved");
        let canonical_parent = real_parent.canonicalize().expect("canonicalize");
        assert_eq!(resolved, canonical_parent.join("leaf"));
    }

    #[test]
    fn missing_tree_surfaces_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = IdmapSet::new();
        let err = set
            .shift_tree(
                &dir.path().join("gone"),
                ShiftDirection::Out,
                false,
                None,
            )
            .expect_err("missing root");
        assert!(matches!(err, ShiftError::Io { .. }));
    }
}
