//! File capability xattrs and the VFS v3 support probe.
//!
//! Capability blobs are carried opaquely through a shift except for the
//! revision-3 `rootid` field, which must name the container's root uid for
//! the capability to survive inside the namespace.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::xattr;

/// Name of the file-capability xattr.
pub const XATTR_NAME_CAPS: &str = "security.capability";

const VFS_CAP_REVISION_MASK: u32 = 0xff00_0000;
const VFS_CAP_REVISION_2: u32 = 0x0200_0000;
const VFS_CAP_REVISION_3: u32 = 0x0300_0000;
const VFS_CAP_FLAGS_EFFECTIVE: u32 = 0x1;

/// Size of a revision-2 blob: magic plus two (permitted, inheritable) pairs.
const XATTR_CAPS_SZ_2: usize = 20;
/// Size of a revision-3 blob: revision 2 plus the trailing rootid.
const XATTR_CAPS_SZ_3: usize = 24;

const VFS3_FSCAPS_UNSUPPORTED: i32 = 0;
const VFS3_FSCAPS_SUPPORTED: i32 = 1;
const VFS3_FSCAPS_UNKNOWN: i32 = -1;

static VFS3_FSCAPS: AtomicI32 = AtomicI32::new(VFS3_FSCAPS_UNKNOWN);

/// Reads the raw capability blob of a file. `Ok(None)` when the file
/// carries no capabilities.
pub fn get_caps(path: &Path) -> io::Result<Option<Vec<u8>>> {
    xattr::lgetxattr(path, XATTR_NAME_CAPS)
}

/// Writes a capability blob back to a file.
///
/// A positive `rootuid` upgrades the blob to revision 3 carrying that uid,
/// so the capability stays valid for the namespace whose root maps to it.
pub fn set_caps(path: &Path, caps: &[u8], rootuid: i64) -> io::Result<()> {
    let blob = match u32::try_from(rootuid) {
        Ok(root_id) if root_id > 0 => with_root_uid(caps, root_id)?,
        _ => caps.to_vec(),
    };
    xattr::lsetxattr(path, XATTR_NAME_CAPS, &blob)
}

/// Whether the filesystem under `dir` accepts revision-3 capability xattrs
/// with a non-zero rootid. Probes on first use; the process-wide answer is
/// cached and never re-evaluated.
pub fn supports_vfs3_fscaps(dir: &Path) -> bool {
    match VFS3_FSCAPS.load(Ordering::SeqCst) {
        VFS3_FSCAPS_UNKNOWN => {
            let supported = probe_vfs3_fscaps(dir);
            VFS3_FSCAPS.store(
                if supported {
                    VFS3_FSCAPS_SUPPORTED
                } else {
                    VFS3_FSCAPS_UNSUPPORTED
                },
                Ordering::SeqCst,
            );
            supported
        }
        state => state == VFS3_FSCAPS_SUPPORTED,
    }
}

/// Cached probe answer without triggering a probe. `false` while unknown.
pub(crate) fn vfs3_fscaps_cached() -> bool {
    VFS3_FSCAPS.load(Ordering::SeqCst) == VFS3_FSCAPS_SUPPORTED
}

#[cfg(test)]
pub(crate) fn reset_vfs3_fscaps() {
    VFS3_FSCAPS.store(VFS3_FSCAPS_UNKNOWN, Ordering::SeqCst);
}

fn probe_vfs3_fscaps(dir: &Path) -> bool {
    let scratch = match tempfile::Builder::new()
        .prefix(".nsshift_vfs3_")
        .tempfile_in(dir)
    {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "vfs3 probe scratch file failed");
            return false;
        }
    };

    // CAP_CHOWN in the permitted set, effective, owned by a non-zero root.
    let mut blob = [0u8; XATTR_CAPS_SZ_3];
    write_le_u32(&mut blob, 0, VFS_CAP_REVISION_3 | VFS_CAP_FLAGS_EFFECTIVE);
    write_le_u32(&mut blob, 4, 1);
    write_le_u32(&mut blob, 20, 1_000);

    if let Err(err) = xattr::lsetxattr(scratch.path(), XATTR_NAME_CAPS, &blob) {
        tracing::debug!(dir = %dir.display(), error = %err, "vfs3 capability write refused");
        return false;
    }

    match xattr::lgetxattr(scratch.path(), XATTR_NAME_CAPS) {
        Ok(Some(read)) => {
            read.len() == XATTR_CAPS_SZ_3
                && read_le_u32(&read, 0) & VFS_CAP_REVISION_MASK == VFS_CAP_REVISION_3
                && read_le_u32(&read, 20) != 0
        }
        Ok(None) | Err(_) => false,
    }
}

/// Rewrites a blob to revision 3 with the given rootid, upgrading
/// revision-2 blobs in place.
fn with_root_uid(caps: &[u8], rootuid: u32) -> io::Result<Vec<u8>> {
    if caps.len() < XATTR_CAPS_SZ_2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "capability blob too short",
        ));
    }

    let magic = read_le_u32(caps, 0);
    match magic & VFS_CAP_REVISION_MASK {
        VFS_CAP_REVISION_2 => {
            let mut blob = caps[..XATTR_CAPS_SZ_2].to_vec();
            write_le_u32(&mut blob, 0, (magic & !VFS_CAP_REVISION_MASK) | VFS_CAP_REVISION_3);
            blob.extend_from_slice(&rootuid.to_le_bytes());
            Ok(blob)
        }
        VFS_CAP_REVISION_3 if caps.len() >= XATTR_CAPS_SZ_3 => {
            let mut blob = caps.to_vec();
            write_le_u32(&mut blob, 20, rootuid);
            Ok(blob)
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unrecognized capability blob revision",
        )),
    }
}

fn read_le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn write_le_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2_blob() -> Vec<u8> {
        let mut blob = vec![0u8; XATTR_CAPS_SZ_2];
        write_le_u32(&mut blob, 0, VFS_CAP_REVISION_2 | VFS_CAP_FLAGS_EFFECTIVE);
        write_le_u32(&mut blob, 4, 0b1010);
        blob
    }

    #[test]
    fn v2_blob_upgrades_to_v3_with_rootid() {
        let upgraded = with_root_uid(&v2_blob(), 100_000).expect("upgrade");
        assert_eq!(upgraded.len(), XATTR_CAPS_SZ_3);
        assert_eq!(
            read_le_u32(&upgraded, 0) & VFS_CAP_REVISION_MASK,
            VFS_CAP_REVISION_3
        );
        assert_eq!(read_le_u32(&upgraded, 0) & VFS_CAP_FLAGS_EFFECTIVE, 1);
        assert_eq!(read_le_u32(&upgraded, 4), 0b1010);
        assert_eq!(read_le_u32(&upgraded, 20), 100_000);
    }

    #[test]
    fn v3_blob_gets_its_rootid_replaced() {
        let mut blob = v2_blob();
        write_le_u32(&mut blob, 0, VFS_CAP_REVISION_3);
        blob.extend_from_slice(&42u32.to_le_bytes());

        let rewritten = with_root_uid(&blob, 100_000).expect("rewrite");
        assert_eq!(read_le_u32(&rewritten, 20), 100_000);
    }

    #[test]
    fn short_or_unknown_blobs_are_rejected() {
        assert!(with_root_uid(&[0u8; 4], 1).is_err());

        let mut unknown = v2_blob();
        write_le_u32(&mut unknown, 0, 0x0100_0000);
        assert!(with_root_uid(&unknown, 1).is_err());
    }

    #[test]
    fn cache_transition_is_one_shot() {
        reset_vfs3_fscaps();
        assert!(!vfs3_fscaps_cached());

        // Unprivileged processes can't write security xattrs, so the first
        // probe settles the cache on some definite answer.
        let dir = tempfile::tempdir().expect("tempdir");
        let first = supports_vfs3_fscaps(dir.path());
        assert_eq!(vfs3_fscaps_cached(), first);

        // A second call must not flip the settled state.
        let second = supports_vfs3_fscaps(dir.path());
        assert_eq!(first, second);
    }
}
