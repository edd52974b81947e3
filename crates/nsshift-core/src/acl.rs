//! POSIX ACL translation at the xattr layer.
//!
//! ACLs live in `system.posix_acl_access` / `system.posix_acl_default`
//! blobs: a little-endian `u32` version header followed by 8-byte entries
//! of `{u16 tag, u16 perm, u32 id}`. Only `ACL_USER` and `ACL_GROUP`
//! entries carry a qualifier id that needs translating.

use std::io;
use std::path::Path;

use crate::range::Axis;
use crate::xattr;

/// Access ACL xattr name.
pub const XATTR_NAME_POSIX_ACL_ACCESS: &str = "system.posix_acl_access";
/// Default ACL xattr name (directories only).
pub const XATTR_NAME_POSIX_ACL_DEFAULT: &str = "system.posix_acl_default";

const POSIX_ACL_XATTR_VERSION: u32 = 2;
const ACL_ENTRY_SIZE: usize = 8;
const ACL_HEADER_SIZE: usize = 4;

const ACL_USER: u16 = 0x02;
const ACL_GROUP: u16 = 0x08;
const ACL_UNDEFINED_ID: u32 = u32::MAX;

/// Rewrites the user/group qualifiers of both ACL xattrs of `path` through
/// `translate`, which receives the qualifier and its axis and returns the
/// translated id or `-1` for "leave unchanged". Files without ACLs are a
/// no-op.
pub fn shift_acl_ids(path: &Path, translate: &dyn Fn(i64, Axis) -> i64) -> io::Result<()> {
    for name in [XATTR_NAME_POSIX_ACL_ACCESS, XATTR_NAME_POSIX_ACL_DEFAULT] {
        let Some(blob) = xattr::lgetxattr(path, name)? else {
            continue;
        };
        if let Some(rewritten) = rewrite_acl_blob(&blob, translate)? {
            xattr::lsetxattr(path, name, &rewritten)?;
        }
    }
    Ok(())
}

/// Translates qualifier ids inside one ACL blob. Returns `None` when no id
/// changed, so callers skip the write-back.
fn rewrite_acl_blob(
    blob: &[u8],
    translate: &dyn Fn(i64, Axis) -> i64,
) -> io::Result<Option<Vec<u8>>> {
    if blob.len() < ACL_HEADER_SIZE || (blob.len() - ACL_HEADER_SIZE) % ACL_ENTRY_SIZE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "truncated POSIX ACL blob",
        ));
    }

    let version = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
    if version != POSIX_ACL_XATTR_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unknown POSIX ACL version",
        ));
    }

    let mut out = blob.to_vec();
    let mut changed = false;
    for offset in (ACL_HEADER_SIZE..blob.len()).step_by(ACL_ENTRY_SIZE) {
        let tag = u16::from_le_bytes([blob[offset], blob[offset + 1]]);
        let axis = match tag {
            ACL_USER => Axis::Uid,
            ACL_GROUP => Axis::Gid,
            _ => continue,
        };

        let id_offset = offset + 4;
        let id = u32::from_le_bytes([
            blob[id_offset],
            blob[id_offset + 1],
            blob[id_offset + 2],
            blob[id_offset + 3],
        ]);
        if id == ACL_UNDEFINED_ID {
            continue;
        }

        let translated = translate(i64::from(id), axis);
        let Ok(new_id) = u32::try_from(translated) else {
            // Qualifier outside the map; keep it as-is.
            continue;
        };
        if new_id != id {
            out[id_offset..id_offset + 4].copy_from_slice(&new_id.to_le_bytes());
            changed = true;
        }
    }

    Ok(changed.then_some(out))
}
