//! Source-file configuration for the mapping pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Locations of the id databases the readers and resolver consume.
///
/// The defaults point at the host's shadow files and the calling process's
/// kernel maps; tests point the fields at fixture files instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdmapPaths {
    /// Shadow subordinate-uid database.
    pub subuid: PathBuf,
    /// Shadow subordinate-gid database.
    pub subgid: PathBuf,
    /// Kernel uid map of the calling process.
    pub proc_uid_map: PathBuf,
    /// Kernel gid map of the calling process.
    pub proc_gid_map: PathBuf,
}

impl Default for IdmapPaths {
    fn default() -> Self {
        Self::under_rootfs(Path::new("/"))
    }
}

impl IdmapPaths {
    /// Resolves the shadow files under the given rootfs. The kernel maps
    /// always describe the calling process and are not rootfs-relative.
    #[must_use]
    pub fn under_rootfs(rootfs: &Path) -> Self {
        Self {
            subuid: rootfs.join(crate::constants::SUBUID_FILE),
            subgid: rootfs.join(crate::constants::SUBGID_FILE),
            proc_uid_map: PathBuf::from(crate::constants::PROC_SELF_UID_MAP),
            proc_gid_map: PathBuf::from(crate::constants::PROC_SELF_GID_MAP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_host_databases() {
        let paths = IdmapPaths::default();
        assert_eq!(paths.subuid, PathBuf::from("/etc/subuid"));
        assert_eq!(paths.subgid, PathBuf::from("/etc/subgid"));
        assert_eq!(paths.proc_uid_map, PathBuf::from("/proc/self/uid_map"));
    }

    #[test]
    fn under_rootfs_relocates_shadow_files_only() {
        let paths = IdmapPaths::under_rootfs(Path::new("/var/lib/rootfs"));
        assert_eq!(paths.subuid, PathBuf::from("/var/lib/rootfs/etc/subuid"));
        assert_eq!(paths.subgid, PathBuf::from("/var/lib/rootfs/etc/subgid"));
        assert_eq!(paths.proc_gid_map, PathBuf::from("/proc/self/gid_map"));
    }
}
